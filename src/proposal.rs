//! Read-only projection of an on-chain proposal

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::abi::Decoder;
use crate::types::Address;
use crate::units::TokenAmount;
use crate::GovernanceError;

/// Proposal as returned by `getProposal(id)`
///
/// `finished` is what decides whether voting is closed; the contract may close
/// a proposal before `end_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub id: u64,
    /// Calldata executed against `target_contract` if the proposal passes
    #[serde(with = "hex_bytes")]
    pub call_data: Vec<u8>,
    pub target_contract: Address,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub yes_votes: TokenAmount,
    pub no_votes: TokenAmount,
    pub executed: bool,
    pub finished: bool,
}

impl Proposal {
    /// Decode the `getProposal` return tuple
    ///
    /// Layout: `(bytes callData, address targetContract, uint256 startTime,
    /// uint256 endTime, uint256 yesVotes, uint256 noVotes, bool executed,
    /// bool finished)`.
    pub fn decode(id: u64, data: &[u8]) -> Result<Self, GovernanceError> {
        let decoder = Decoder::new(data);

        let call_data = decoder.bytes(0)?;
        let target_contract = decoder.address(1)?;
        let start_secs = decoder.uint64(2)?;
        let end_secs = decoder.uint64(3)?;
        let yes_votes = TokenAmount::from_base_units(decoder.uint(4)?);
        let no_votes = TokenAmount::from_base_units(decoder.uint(5)?);
        let executed = decoder.bool(6)?;
        let finished = decoder.bool(7)?;

        if end_secs <= start_secs {
            return Err(GovernanceError::invalid_response(format!(
                "proposal {} has end time {} not after start time {}",
                id, end_secs, start_secs
            )));
        }

        Ok(Self {
            id,
            call_data,
            target_contract,
            start_time: timestamp(start_secs)?,
            end_time: timestamp(end_secs)?,
            yes_votes,
            no_votes,
            executed,
            finished,
        })
    }

    /// Best-effort hint whether votes would still be accepted at `now`
    ///
    /// The contract has the final word; a vote cast on a proposal that closed
    /// in the meantime still comes back as a revert.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.end_time && !self.finished
    }

    pub fn total_votes(&self) -> TokenAmount {
        self.yes_votes
            .checked_add(self.no_votes)
            .unwrap_or(TokenAmount::from_base_units(u128::MAX))
    }

    /// Share of yes votes in percent, 0 when nobody voted
    pub fn yes_share(&self) -> f64 {
        let total = self.yes_votes.as_f64() + self.no_votes.as_f64();
        if total == 0.0 {
            0.0
        } else {
            self.yes_votes.as_f64() / total * 100.0
        }
    }
}

fn timestamp(secs: u64) -> Result<DateTime<Utc>, GovernanceError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| GovernanceError::invalid_response(format!("timestamp out of range: {}", secs)))
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::types::encode_hex_bytes(bytes))
    }
}
