#![allow(missing_docs)]

use alloy_primitives::hex;
use evmjit::{
    eyre::{bail, eyre, Result, WrapErr},
    op, U256,
};
use std::{cmp::Ordering, path::Path, str::FromStr};

pub fn read_code(code: Option<&str>, code_path: Option<&Path>) -> Result<Vec<u8>> {
    if let Some(code) = code {
        return read_code_string(code.trim().as_bytes(), None);
    }

    if let Some(code_path) = code_path {
        let contents = std::fs::read(code_path)
            .wrap_err_with(|| format!("failed to read {}", code_path.display()))?;
        let ext = code_path.extension().and_then(|s| s.to_str());
        return read_code_string(&contents, ext);
    }

    Err(eyre!("one of --code, --code-path is required"))
}

/// How code given on the command line or in a file is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeFormat {
    /// Hex text. Only the first line is read.
    Hex,
    /// Raw bytes.
    Bin,
    /// Opcode mnemonics, see [`parse_evm_dsl`].
    Dsl,
    /// Mnemonics if they parse, hex otherwise.
    Auto,
}

impl CodeFormat {
    /// Picks the format from the file extension, falling back to sniffing the contents.
    pub fn detect(contents: &[u8], ext: Option<&str>) -> Self {
        match ext {
            Some("hex") => Self::Hex,
            Some("bin") => Self::Bin,
            Some("evm") => Self::Dsl,
            _ if contents.starts_with(b"0x") || contents.starts_with(b"0X") => Self::Hex,
            _ if !contents.is_ascii() => Self::Bin,
            _ => Self::Auto,
        }
    }
}

pub fn read_code_string(contents: &[u8], ext: Option<&str>) -> Result<Vec<u8>> {
    let format = CodeFormat::detect(contents, ext);
    if format == CodeFormat::Bin {
        return Ok(contents.to_vec());
    }
    let text = std::str::from_utf8(contents).wrap_err("given code is not valid UTF-8")?.trim();
    let decode_hex = |s: &str| hex::decode(s).wrap_err("given code is not valid hex");
    match format {
        CodeFormat::Hex => decode_hex(text.lines().next().unwrap_or_default().trim()),
        CodeFormat::Dsl => parse_evm_dsl(text),
        _ => parse_evm_dsl(text).or_else(|_| decode_hex(text)),
    }
}

/// Parses code written as opcode mnemonics.
///
/// `;` starts a comment that runs to the end of the line. `PUSH <imm>` picks the smallest push
/// that fits the immediate, while `PUSHn <imm>` left-pads it to `n` bytes.
pub fn parse_evm_dsl(s: &str) -> Result<Vec<u8>> {
    const COM: char = ';';

    let mut code = Vec::with_capacity(32);

    let lines = s.lines().map(|line| line.split(COM).next().unwrap_or_default().trim());
    let mut words = lines.flat_map(str::split_whitespace).peekable();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("PUSH") {
            let next = words.next().ok_or_else(|| eyre!("missing immediate for opcode PUSH"))?;
            let imm_bytes = parse_imm(next, None)?;
            code.push(op::PUSH0 + imm_bytes.len() as u8);
            code.extend_from_slice(&imm_bytes);
            continue;
        }

        let opcode = parse_opcode(word).ok_or_else(|| eyre!("invalid opcode: {word:?}"))?;
        code.push(opcode);
        let imm_len = op::imm_len(opcode);
        if imm_len > 0 {
            let imm = words.next().ok_or_else(|| eyre!("missing immediate for opcode {word}"))?;
            code.extend_from_slice(&parse_imm(imm, Some(imm_len))?);
        } else if let Some(next) = words.peek() {
            if U256::from_str(next).is_ok() {
                bail!("unexpected immediate for opcode {word}");
            }
        }
    }

    Ok(code)
}

fn parse_opcode(word: &str) -> Option<u8> {
    let aliases = [("SHA3", op::SHA3), ("PREVHASH", op::PREVHASH), ("SUICIDE", op::SUICIDE)];
    if let Some(&(_, opcode)) = aliases.iter().find(|(name, _)| name.eq_ignore_ascii_case(word)) {
        return Some(opcode);
    }
    op::OPCODE_NAMES
        .iter()
        .position(|name| name.is_some_and(|name| name.eq_ignore_ascii_case(word)))
        .map(|opcode| opcode as u8)
}

fn parse_imm(s: &str, size: Option<u8>) -> Result<Vec<u8>> {
    let num: U256 = s.parse().wrap_err_with(|| format!("failed to parse immediate {s:?}"))?;
    let mut imm_bytes = num.to_be_bytes_trimmed_vec();
    if let Some(size) = size {
        match imm_bytes.len().cmp(&(size as usize)) {
            Ordering::Less => {
                let extend = size as usize - imm_bytes.len();
                imm_bytes.splice(0..0, std::iter::repeat(0).take(extend));
            }
            Ordering::Equal => {}
            Ordering::Greater => {
                bail!("expected at most {size} immediate bytes, got {}", imm_bytes.len())
            }
        }
    }
    Ok(imm_bytes)
}
