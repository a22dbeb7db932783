// crates/aligned-core/src/abi.rs
//
// Canonical ABI encoding of TaskResponse.
//
// The service manager verifies signatures over keccak256(abi.encode(response)),
// so the bytes produced here must match Solidity's tuple encoding exactly:
// one 32-byte big-endian word per static field, in declaration order.

use alloy_sol_types::SolValue;

use crate::error::EncodingError;
use crate::task::TaskResponse;

/// Size of one ABI word.
pub const WORD_SIZE: usize = 32;

/// One field of the on-chain struct: its Solidity name and type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub sol_type: &'static str,
}

/// Field list of `struct TaskResponse { uint64 taskIndex; bool proofIsCorrect; }`.
///
/// Order matters: it is the order of words in the encoding.
pub const TASK_RESPONSE_SCHEMA: &[SchemaField] = &[
    SchemaField {
        name: "taskIndex",
        sol_type: "uint64",
    },
    SchemaField {
        name: "proofIsCorrect",
        sol_type: "bool",
    },
];

/// Static scalar types the encoder knows how to lay out in a single word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `uintN`, N in 8..=256 and a multiple of 8.
    Uint(u16),
    /// `intN`, N in 8..=256 and a multiple of 8.
    Int(u16),
    Bool,
    Address,
    /// `bytesN`, N in 1..=32.
    FixedBytes(u8),
}

impl FieldType {
    /// Parse a Solidity type descriptor. Returns `None` for anything that is
    /// not a single-word static type.
    pub fn parse(descriptor: &str) -> Option<Self> {
        match descriptor {
            "bool" => return Some(FieldType::Bool),
            "address" => return Some(FieldType::Address),
            "uint" => return Some(FieldType::Uint(256)),
            "int" => return Some(FieldType::Int(256)),
            _ => {}
        }

        if let Some(bits) = descriptor.strip_prefix("uint") {
            return parse_bits(bits).map(FieldType::Uint);
        }
        if let Some(bits) = descriptor.strip_prefix("int") {
            return parse_bits(bits).map(FieldType::Int);
        }
        if let Some(digits) = descriptor.strip_prefix("bytes") {
            if digits.starts_with('0') {
                return None;
            }
            let len: u8 = digits.parse().ok()?;
            if (1..=32).contains(&len) {
                return Some(FieldType::FixedBytes(len));
            }
        }
        None
    }
}

fn parse_bits(bits: &str) -> Option<u16> {
    if bits.starts_with('0') {
        return None;
    }
    let bits: u16 = bits.parse().ok()?;
    if bits % 8 == 0 && (8..=256).contains(&bits) {
        Some(bits)
    } else {
        None
    }
}

/// Check every descriptor in `schema` and return the expected encoded length.
pub fn validate_schema(schema: &[SchemaField]) -> Result<usize, EncodingError> {
    for field in schema {
        if FieldType::parse(field.sol_type).is_none() {
            return Err(EncodingError::InvalidType {
                field: field.name,
                descriptor: field.sol_type,
            });
        }
    }
    Ok(schema.len() * WORD_SIZE)
}

/// ABI-encode a task response as the `(uint64, bool)` tuple.
pub fn encode(response: &TaskResponse) -> Result<Vec<u8>, EncodingError> {
    let expected = validate_schema(TASK_RESPONSE_SCHEMA)?;
    let encoded = response.abi_encode();
    if encoded.len() != expected {
        return Err(EncodingError::LayoutMismatch {
            expected,
            actual: encoded.len(),
        });
    }
    Ok(encoded)
}

/// Decode bytes produced by [`encode`], rejecting non-canonical words.
///
/// The input must be exactly what [`encode`] would produce for the decoded
/// value: dirty padding in the uint64 word or a bool word other than 0 or 1
/// is an error.
pub fn decode(data: &[u8]) -> Result<TaskResponse, EncodingError> {
    let expected = validate_schema(TASK_RESPONSE_SCHEMA)?;
    if data.len() != expected {
        return Err(EncodingError::LayoutMismatch {
            expected,
            actual: data.len(),
        });
    }
    let response = <TaskResponse as SolValue>::abi_decode(data, true)
        .map_err(|e| EncodingError::Decode(e.to_string()))?;

    if encode(&response)? != data {
        return Err(EncodingError::Decode(format!(
            "non-canonical encoding: 0x{}",
            hex::encode(data)
        )));
    }
    Ok(response)
}
