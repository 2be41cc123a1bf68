//! Symbolic instruction set
//!
//! The CPU unit executes six opcodes. Programs are written in the console
//! pseudo-code, one instruction per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! NO_OP 3
//! WRITE 100 42
//! READ 100
//! COPY 0 100
//! I/O 3000
//! EXIT
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Busy-waits for the configured NO_OP delay
    NoOp,
    /// Blocks the process for `duration_ms` milliseconds of simulated I/O
    Io { duration_ms: u32 },
    /// Terminates the process
    Exit,
    /// Reads the value stored at a logical address
    Read { address: u32 },
    /// Writes `value` at a logical address
    Write { address: u32, value: u32 },
    /// Copies the value at `source` into `destination`
    Copy { destination: u32, source: u32 },
}

impl Instruction {
    /// Whether operands must be fetched from Memory before execution
    ///
    /// Only COPY needs this; every other opcode runs on its immediates.
    pub fn needs_operand_fetch(&self) -> bool {
        matches!(self, Instruction::Copy { .. })
    }

    /// Whether executing this instruction touches Memory
    pub fn touches_memory(&self) -> bool {
        matches!(
            self,
            Instruction::Read { .. } | Instruction::Write { .. } | Instruction::Copy { .. }
        )
    }

    /// Returns the mnemonic used in program text
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::NoOp => "NO_OP",
            Instruction::Io { .. } => "I/O",
            Instruction::Exit => "EXIT",
            Instruction::Read { .. } => "READ",
            Instruction::Write { .. } => "WRITE",
            Instruction::Copy { .. } => "COPY",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::NoOp | Instruction::Exit => write!(f, "{}", self.mnemonic()),
            Instruction::Io { duration_ms } => write!(f, "I/O {}", duration_ms),
            Instruction::Read { address } => write!(f, "READ {}", address),
            Instruction::Write { address, value } => write!(f, "WRITE {} {}", address, value),
            Instruction::Copy {
                destination,
                source,
            } => write!(f, "COPY {} {}", destination, source),
        }
    }
}

/// Errors produced while parsing program text
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseInstructionError {
    #[error("Empty instruction")]
    Empty,

    #[error("Unknown mnemonic: {0}")]
    UnknownMnemonic(String),

    #[error("{mnemonic} expects {expected} parameter(s), got {actual}")]
    WrongArity {
        mnemonic: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter '{0}'")]
    InvalidParameter(String),

    #[error("Line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ParseInstructionError>,
    },
}

fn parse_param(raw: &str) -> Result<u32, ParseInstructionError> {
    raw.parse::<u32>()
        .map_err(|_| ParseInstructionError::InvalidParameter(raw.to_string()))
}

fn expect_params(
    mnemonic: &'static str,
    params: &[&str],
    expected: usize,
) -> Result<(), ParseInstructionError> {
    if params.len() != expected {
        return Err(ParseInstructionError::WrongArity {
            mnemonic,
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}

impl FromStr for Instruction {
    type Err = ParseInstructionError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let mnemonic = parts.next().ok_or(ParseInstructionError::Empty)?;
        let params: Vec<&str> = parts.collect();

        match mnemonic.to_ascii_uppercase().as_str() {
            "NO_OP" => {
                if params.len() > 1 {
                    return Err(ParseInstructionError::WrongArity {
                        mnemonic: "NO_OP",
                        expected: 0,
                        actual: params.len(),
                    });
                }
                Ok(Instruction::NoOp)
            }
            "I/O" | "IO" => {
                expect_params("I/O", &params, 1)?;
                Ok(Instruction::Io {
                    duration_ms: parse_param(params[0])?,
                })
            }
            "EXIT" => {
                expect_params("EXIT", &params, 0)?;
                Ok(Instruction::Exit)
            }
            "READ" => {
                expect_params("READ", &params, 1)?;
                Ok(Instruction::Read {
                    address: parse_param(params[0])?,
                })
            }
            "WRITE" => {
                expect_params("WRITE", &params, 2)?;
                Ok(Instruction::Write {
                    address: parse_param(params[0])?,
                    value: parse_param(params[1])?,
                })
            }
            "COPY" => {
                expect_params("COPY", &params, 2)?;
                Ok(Instruction::Copy {
                    destination: parse_param(params[0])?,
                    source: parse_param(params[1])?,
                })
            }
            other => Err(ParseInstructionError::UnknownMnemonic(other.to_string())),
        }
    }
}

/// Parses a whole program
///
/// `NO_OP n` expands to `n` consecutive no-ops.
pub fn parse_program(text: &str) -> Result<Vec<Instruction>, ParseInstructionError> {
    let mut program = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let at_line = |source: ParseInstructionError| ParseInstructionError::AtLine {
            line: index + 1,
            source: Box::new(source),
        };

        let instruction: Instruction = line.parse().map_err(at_line)?;
        let repeat = match instruction {
            Instruction::NoOp => match line.split_whitespace().nth(1) {
                Some(count) => parse_param(count).map_err(at_line)?,
                None => 1,
            },
            _ => 1,
        };

        for _ in 0..repeat {
            program.push(instruction);
        }
    }

    Ok(program)
}
