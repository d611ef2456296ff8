//! The responder's answer, carried as a request on the proposal topic.

use {
    super::{IrnMetadata, Peer, Relay},
    crate::domain::Topic,
    serde::{Deserialize, Serialize},
};

pub(super) const IRN_REQUEST_METADATA: IrnMetadata = IrnMetadata {
    tag: 1000,
    ttl: 300,
    prompt: false,
};

pub(super) const IRN_RESPONSE_METADATA: IrnMetadata = IrnMetadata {
    tag: 1001,
    ttl: 300,
    prompt: false,
};

/// Outcome of a pairing attempt.
///
/// A success carries everything the proposer needs to mirror the settlement;
/// a failure carries the reason only.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(untagged)]
pub enum PairingOutcome {
    Success(OutcomeSuccess),
    Failure(OutcomeFailure),
}

impl PairingOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(OutcomeFailure {
            reason: reason.into(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSuccess {
    /// The settled topic, derived from the shared key.
    pub topic: Topic,
    pub relay: Relay,
    pub responder: Peer,
    /// Unix timestamp at which the settled pairing expires. Identical on
    /// both sides.
    pub expiry: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeFailure {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::super::tests::param_serde_test;
    use anyhow::Result;

    #[test]
    fn test_serde_outcome_success() -> Result<()> {
        let json = r#"
        {
            "topic": "b752e5d8ac64b3b04d6a432dbe76b9e2334f72fd2b0d1b3a50906e1497d1c145",
            "relay": {
                "protocol": "irn"
            },
            "responder": {
                "publicKey": "83d24a867c6af4dd160fa5f3cc4b32f04a00a0da088ff346cd736e0b97c358b0"
            },
            "expiry": 1675759043
        }
        "#;

        param_serde_test::<PairingOutcome>(json)
    }

    #[test]
    fn test_serde_outcome_failure() -> Result<()> {
        let json = r#"
        {
            "reason": "not_approved"
        }
        "#;

        param_serde_test::<PairingOutcome>(json)
    }

    #[test]
    fn outcome_variant_discrimination() -> Result<()> {
        let failure: PairingOutcome = serde_json::from_str(r#"{"reason":"boom"}"#)?;
        assert!(failure.is_failure());

        let success: PairingOutcome = serde_json::from_str(
            r#"{
                "topic": "b752e5d8ac64b3b04d6a432dbe76b9e2334f72fd2b0d1b3a50906e1497d1c145",
                "relay": {"protocol": "irn"},
                "responder": {"publicKey": "83d24a867c6af4dd160fa5f3cc4b32f04a00a0da088ff346cd736e0b97c358b0"},
                "expiry": 1675759043
            }"#,
        )?;
        assert!(!success.is_failure());

        Ok(())
    }
}
