//! Minimal Solidity ABI codec for the governance contract
//!
//! Covers exactly the shapes the contract surface needs: `uint256`,
//! `address`, `bool`, `bytes` and `string`, head/tail encoded. Integers are
//! carried as `u128`; a word whose upper 16 bytes are not zero is reported as
//! an invalid response rather than silently truncated.

use crate::types::Address;
use crate::GovernanceError;

/// Size of one ABI word
pub const WORD: usize = 32;

/// Four-byte function selector
pub type Selector = [u8; 4];

/// `getProposalsCount()`
pub const GET_PROPOSALS_COUNT: Selector = [0x98, 0xe5, 0x27, 0xd3];
/// `getProposal(uint256)`
pub const GET_PROPOSAL: Selector = [0xc7, 0xf7, 0x58, 0xa8];
/// `userInfo(address)`
pub const USER_INFO: Selector = [0x19, 0x59, 0xa0, 0x02];
/// `getDeposit(address)`
pub const GET_DEPOSIT: Selector = [0xe1, 0x25, 0x4f, 0xba];
/// `deposit(uint256)`
pub const DEPOSIT: Selector = [0xb6, 0xb5, 0x5f, 0x25];
/// `vote(uint256,bool,uint256)`
pub const VOTE: Selector = [0xd4, 0x6a, 0x5d, 0x7e];
/// `withdraw()`
pub const WITHDRAW: Selector = [0x3c, 0xcf, 0xd6, 0x0b];
/// `Error(string)` revert payload
pub const ERROR_STRING: Selector = [0x08, 0xc3, 0x79, 0xa0];

/// A single ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address(Address),
    Bool(bool),
    Bytes(Vec<u8>),
    String(String),
}

/// Encode a tuple of tokens (no selector)
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Address(address) => head.extend_from_slice(&address_word(address)),
            Token::Bool(flag) => head.extend_from_slice(&uint_word(*flag as u128)),
            Token::Bytes(bytes) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                append_dynamic(&mut tail, bytes);
            }
            Token::String(text) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                append_dynamic(&mut tail, text.as_bytes());
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Encode a contract call: selector followed by the encoded arguments
pub fn encode_call(selector: Selector, args: &[Token]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector);
    data.extend_from_slice(&encode(args));
    data
}

/// Split calldata into its selector and argument bytes
pub fn split_selector(data: &[u8]) -> Option<(Selector, &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);
    Some((selector, &data[4..]))
}

/// Encode an `Error(string)` revert payload
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    encode_call(ERROR_STRING, &[Token::String(reason.to_string())])
}

/// Decode the reason of an `Error(string)` revert payload, if it is one
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (selector, args) = split_selector(data)?;
    if selector != ERROR_STRING {
        return None;
    }
    Decoder::new(args).string(0).ok()
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn append_dynamic(tail: &mut Vec<u8>, bytes: &[u8]) {
    tail.extend_from_slice(&uint_word(bytes.len() as u128));
    tail.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    tail.extend(std::iter::repeat(0u8).take(padding));
}

/// Positional reader over ABI-encoded return data
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of whole words in the payload
    pub fn word_count(&self) -> usize {
        self.data.len() / WORD
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8], GovernanceError> {
        offset
            .checked_add(WORD)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                GovernanceError::invalid_response(format!(
                    "ABI data too short: need word at byte {}, have {} bytes",
                    offset,
                    self.data.len()
                ))
            })
    }

    fn word(&self, index: usize) -> Result<&'a [u8], GovernanceError> {
        self.word_at(index * WORD)
    }

    fn uint_at(&self, offset: usize) -> Result<u128, GovernanceError> {
        let word = self.word_at(offset)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(GovernanceError::invalid_response(
                "uint256 value does not fit in 128 bits",
            ));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    /// `uint256` at head position `index`
    pub fn uint(&self, index: usize) -> Result<u128, GovernanceError> {
        self.uint_at(index * WORD)
    }

    /// `uint256` at head position `index` that must fit a u64 (ids, timestamps)
    pub fn uint64(&self, index: usize) -> Result<u64, GovernanceError> {
        let value = self.uint(index)?;
        u64::try_from(value)
            .map_err(|_| GovernanceError::invalid_response(format!("value {} exceeds u64", value)))
    }

    /// `address` at head position `index`
    pub fn address(&self, index: usize) -> Result<Address, GovernanceError> {
        let word = self.word(index)?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(GovernanceError::invalid_response("address word has dirty upper bytes"));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Ok(Address::from_bytes(bytes))
    }

    /// `bool` at head position `index`
    pub fn bool(&self, index: usize) -> Result<bool, GovernanceError> {
        match self.uint(index)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(GovernanceError::invalid_response(format!(
                "invalid bool word: {}",
                other
            ))),
        }
    }

    /// `bytes` whose offset sits at head position `index`
    pub fn bytes(&self, index: usize) -> Result<Vec<u8>, GovernanceError> {
        let offset = usize::try_from(self.uint(index)?)
            .map_err(|_| GovernanceError::invalid_response("dynamic offset too large"))?;
        let len = usize::try_from(self.uint_at(offset)?)
            .map_err(|_| GovernanceError::invalid_response("dynamic length too large"))?;
        let start = offset + WORD;
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .map(|slice| slice.to_vec())
            .ok_or_else(|| {
                GovernanceError::invalid_response(format!(
                    "dynamic value of {} bytes at {} runs past the payload",
                    len, start
                ))
            })
    }

    /// `string` whose offset sits at head position `index`
    pub fn string(&self, index: usize) -> Result<String, GovernanceError> {
        String::from_utf8(self.bytes(index)?)
            .map_err(|e| GovernanceError::invalid_response(format!("invalid UTF-8 string: {}", e)))
    }
}
