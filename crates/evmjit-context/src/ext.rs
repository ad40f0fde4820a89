use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use rustc_hash::FxHashMap;

/// The kind of a nested call.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `CALL`.
    Call,
    /// `CALLCODE`.
    CallCode,
    /// `DELEGATECALL`.
    DelegateCall,
    /// `STATICCALL`.
    StaticCall,
}

/// Inputs of a nested call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallInputs<'a> {
    /// The kind of call.
    pub kind: CallKind,
    /// The account whose code is executed.
    pub code_address: Address,
    /// The account whose storage is used.
    pub target: Address,
    /// The caller seen by the callee.
    pub caller: Address,
    /// Value transferred to `target`.
    pub value: U256,
    /// Call data.
    pub input: &'a [u8],
    /// Gas available to the callee.
    pub gas_limit: u64,
    /// Depth of the callee.
    pub depth: usize,
    /// Whether the callee may modify state.
    pub is_static: bool,
}

/// Outcome of a nested call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallOutcome {
    /// Whether the call succeeded.
    pub success: bool,
    /// Data returned or reverted with by the callee.
    pub output: Bytes,
    /// Unused gas.
    pub gas_remaining: u64,
}

/// Inputs of a nested create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreateInputs<'a> {
    /// The creator.
    pub caller: Address,
    /// Endowment of the new account.
    pub value: U256,
    /// Initialization code.
    pub init_code: &'a [u8],
    /// Gas available to the initialization code.
    pub gas_limit: u64,
    /// Depth of the initialization code.
    pub depth: usize,
}

/// Outcome of a nested create.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateOutcome {
    /// The new account, or `None` if creation failed.
    pub address: Option<Address>,
    /// Unused gas.
    pub gas_remaining: u64,
}

/// A log record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogEntry {
    /// The emitting account.
    pub address: Address,
    /// Indexed topics, at most 4.
    pub topics: Vec<B256>,
    /// Log data.
    pub data: Bytes,
}

/// The environment a compiled function executes in.
///
/// Compiled code never calls these methods directly. It goes through the out-of-line builtins,
/// which convert between the 256-bit register representation and the host types used here.
///
/// Storage keys and values are exchanged as big-endian [`B256`] words.
pub trait Ext {
    /// Address of the executing account.
    fn address(&self) -> Address;
    /// Direct caller.
    fn caller(&self) -> Address;
    /// Transaction origin.
    fn origin(&self) -> Address;
    /// Value sent with the current call.
    fn call_value(&self) -> U256;
    /// Call data.
    fn call_data(&self) -> &[u8];
    /// Code of the executing account.
    fn code(&self) -> &[u8];
    /// Transaction gas price.
    fn gas_price(&self) -> U256;

    /// Balance of `address`.
    fn balance(&mut self, address: Address) -> U256;
    /// Code of `address`.
    fn ext_code(&mut self, address: Address) -> Bytes;

    /// Reads a storage slot of the executing account.
    fn sload(&mut self, key: B256) -> B256;
    /// Writes a storage slot of the executing account.
    fn sstore(&mut self, key: B256, value: B256);

    /// Hash of a recent block. Only called for the 256 most recent blocks.
    fn block_hash(&mut self, number: u64) -> B256;
    /// Block beneficiary.
    fn coinbase(&self) -> Address;
    /// Block timestamp.
    fn timestamp(&self) -> U256;
    /// Block number.
    fn number(&self) -> U256;
    /// Block difficulty.
    fn difficulty(&self) -> U256;
    /// Block gas limit.
    fn gas_limit(&self) -> U256;

    /// Runs a nested call to completion.
    fn call(&mut self, inputs: CallInputs<'_>) -> CallOutcome;
    /// Runs a nested create to completion.
    fn create(&mut self, inputs: CreateInputs<'_>) -> CreateOutcome;
    /// Records a log.
    fn log(&mut self, log: LogEntry);
    /// Schedules the executing account for destruction.
    fn selfdestruct(&mut self, beneficiary: Address);

    /// Hashes `data`.
    fn sha3(&self, data: &[u8]) -> B256 {
        keccak256(data)
    }
}

/// Block information of a [`DummyExt`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockEnv {
    /// Beneficiary.
    pub coinbase: Address,
    /// Timestamp.
    pub timestamp: U256,
    /// Number.
    pub number: U256,
    /// Difficulty.
    pub difficulty: U256,
    /// Gas limit.
    pub gas_limit: U256,
}

/// An in-memory [`Ext`] that records every side effect.
///
/// Nested calls and creates do not execute any code: they return the configured
/// [`call_outcome`](Self::call_outcome) and [`create_outcome`](Self::create_outcome).
#[derive(Clone, Debug, Default)]
pub struct DummyExt {
    pub address: Address,
    pub caller: Address,
    pub origin: Address,
    pub call_value: U256,
    pub call_data: Bytes,
    pub code: Bytes,
    pub gas_price: U256,
    pub block: BlockEnv,
    pub storage: FxHashMap<B256, B256>,
    pub balances: FxHashMap<Address, U256>,
    pub codes: FxHashMap<Address, Bytes>,
    pub block_hashes: FxHashMap<u64, B256>,
    pub logs: Vec<LogEntry>,
    /// Inputs of every nested call as `(kind, target, value, input, gas_limit)`.
    pub calls: Vec<(CallKind, Address, U256, Bytes, u64)>,
    pub call_outcome: CallOutcome,
    /// Init code and endowment of every nested create.
    pub creates: Vec<(Bytes, U256)>,
    pub create_outcome: CreateOutcome,
    pub selfdestructs: Vec<Address>,
}

impl DummyExt {
    /// Creates a new host executing `code`.
    pub fn new(code: impl Into<Bytes>) -> Self {
        Self { code: code.into(), ..Default::default() }
    }

    /// Sets the call data.
    pub fn with_call_data(mut self, call_data: impl Into<Bytes>) -> Self {
        self.call_data = call_data.into();
        self
    }

    /// Reads a storage slot as an integer.
    pub fn storage_at(&self, key: U256) -> U256 {
        self.storage.get(&B256::from(key)).map_or(U256::ZERO, |v| U256::from_be_bytes(v.0))
    }

    /// Writes a storage slot as an integer.
    pub fn set_storage(&mut self, key: U256, value: U256) {
        self.storage.insert(B256::from(key), B256::from(value));
    }
}

impl Ext for DummyExt {
    fn address(&self) -> Address {
        self.address
    }

    fn caller(&self) -> Address {
        self.caller
    }

    fn origin(&self) -> Address {
        self.origin
    }

    fn call_value(&self) -> U256 {
        self.call_value
    }

    fn call_data(&self) -> &[u8] {
        &self.call_data
    }

    fn code(&self) -> &[u8] {
        &self.code
    }

    fn gas_price(&self) -> U256 {
        self.gas_price
    }

    fn balance(&mut self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn ext_code(&mut self, address: Address) -> Bytes {
        self.codes.get(&address).cloned().unwrap_or_default()
    }

    fn sload(&mut self, key: B256) -> B256 {
        self.storage.get(&key).copied().unwrap_or_default()
    }

    fn sstore(&mut self, key: B256, value: B256) {
        if value.is_zero() {
            self.storage.remove(&key);
        } else {
            self.storage.insert(key, value);
        }
    }

    fn block_hash(&mut self, number: u64) -> B256 {
        self.block_hashes.get(&number).copied().unwrap_or_default()
    }

    fn coinbase(&self) -> Address {
        self.block.coinbase
    }

    fn timestamp(&self) -> U256 {
        self.block.timestamp
    }

    fn number(&self) -> U256 {
        self.block.number
    }

    fn difficulty(&self) -> U256 {
        self.block.difficulty
    }

    fn gas_limit(&self) -> U256 {
        self.block.gas_limit
    }

    fn call(&mut self, inputs: CallInputs<'_>) -> CallOutcome {
        self.calls.push((
            inputs.kind,
            inputs.code_address,
            inputs.value,
            Bytes::copy_from_slice(inputs.input),
            inputs.gas_limit,
        ));
        let mut outcome = self.call_outcome.clone();
        outcome.gas_remaining = outcome.gas_remaining.min(inputs.gas_limit);
        outcome
    }

    fn create(&mut self, inputs: CreateInputs<'_>) -> CreateOutcome {
        self.creates.push((Bytes::copy_from_slice(inputs.init_code), inputs.value));
        let mut outcome = self.create_outcome.clone();
        outcome.gas_remaining = outcome.gas_remaining.min(inputs.gas_limit);
        outcome
    }

    fn log(&mut self, log: LogEntry) {
        self.logs.push(log);
    }

    fn selfdestruct(&mut self, beneficiary: Address) {
        self.selfdestructs.push(beneficiary);
    }
}
