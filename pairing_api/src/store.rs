//! Keyed-by-topic record stores with an encryption boundary.
//!
//! The controller owns two instances: *pending*, keyed by proposal topics,
//! and *settled*, keyed by derived settled topics. Mutations return the
//! resulting lifecycle event as an explicit command; the controller turns
//! those into external events and outbound publishes, which keeps the
//! ordering between durable writes and wire messages in straight-line code.

use {
    crate::crypto::{
        keys::{Keypair, SharedKey},
        payload::{self, EnvelopeType, PubKey},
    },
    dashmap::DashMap,
    pairing_rpc::domain::Topic,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No matching {context} pairing for topic={topic}")]
    NotFound {
        context: &'static str,
        topic: Topic,
    },

    #[error("No keys registered for topic={0}")]
    NoKeys(Topic),

    #[error(transparent)]
    Crypto(#[from] payload::PayloadError),
}

/// Key material registered for a topic. The store encrypts and decrypts at
/// this boundary.
#[derive(Debug, Clone)]
pub enum SubscriptionKeys {
    /// Static keypair; opens type 1 envelopes by recovering the shared key
    /// from the embedded sender public key. Used on proposal topics, where
    /// outbound messages carry explicit keys instead.
    Keypair(Keypair),
    /// Settled shared key plus own public key for outbound envelopes.
    Shared {
        sym_key: SharedKey,
        public_key: PubKey,
    },
}

/// Lifecycle transition produced by a store mutation.
#[derive(Debug, Clone)]
pub enum StoreEvent<T> {
    Created(T),
    Updated(T),
    Deleted { record: T, reason: String },
}

pub struct Subscription<T> {
    context: &'static str,
    records: DashMap<Topic, T>,
    keys: DashMap<Topic, SubscriptionKeys>,
}

impl<T: Clone> Subscription<T> {
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            records: DashMap::new(),
            keys: DashMap::new(),
        }
    }

    fn not_found(&self, topic: &Topic) -> StoreError {
        StoreError::NotFound {
            context: self.context,
            topic: topic.clone(),
        }
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.records.contains_key(topic)
    }

    /// Returns a defensive copy of the record.
    pub fn get(&self, topic: &Topic) -> Result<T, StoreError> {
        self.records
            .get(topic)
            .map(|record| record.clone())
            .ok_or_else(|| self.not_found(topic))
    }

    /// Inserts or replaces the record and its key material.
    pub fn set(&self, topic: Topic, record: T, keys: SubscriptionKeys) -> StoreEvent<T> {
        self.keys.insert(topic.clone(), keys);
        match self.records.insert(topic, record.clone()) {
            None => StoreEvent::Created(record),
            Some(_) => StoreEvent::Updated(record),
        }
    }

    pub fn update<F>(&self, topic: &Topic, apply: F) -> Result<StoreEvent<T>, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let mut entry = self
            .records
            .get_mut(topic)
            .ok_or_else(|| self.not_found(topic))?;
        apply(entry.value_mut());
        Ok(StoreEvent::Updated(entry.value().clone()))
    }

    /// Removes the record and its keys.
    pub fn delete(&self, topic: &Topic, reason: &str) -> Result<StoreEvent<T>, StoreError> {
        let (_, record) = self
            .records
            .remove(topic)
            .ok_or_else(|| self.not_found(topic))?;
        self.keys.remove(topic);
        Ok(StoreEvent::Deleted {
            record,
            reason: reason.to_owned(),
        })
    }

    /// Defensive copies of all records.
    pub fn entries(&self) -> Vec<T> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Decrypts an inbound message with the keys registered for the topic.
    pub fn open(&self, topic: &Topic, message: &str) -> Result<String, StoreError> {
        let keys = self
            .keys
            .get(topic)
            .ok_or_else(|| StoreError::NoKeys(topic.clone()))?;
        let plain = match keys.value() {
            SubscriptionKeys::Keypair(keypair) => payload::decode_and_decrypt_type1(message, keypair)?,
            SubscriptionKeys::Shared { sym_key, .. } => {
                payload::decode_and_decrypt(message, sym_key.as_bytes())?
            }
        };
        Ok(plain)
    }

    /// Encrypts an outbound message with the keys registered for the topic.
    ///
    /// Only settled topics register sealing keys; proposal-topic publishes
    /// supply explicit keys at publish time instead.
    pub fn seal(&self, topic: &Topic, plaintext: &str) -> Result<String, StoreError> {
        let keys = self
            .keys
            .get(topic)
            .ok_or_else(|| StoreError::NoKeys(topic.clone()))?;
        match keys.value() {
            SubscriptionKeys::Shared {
                sym_key,
                public_key,
            } => Ok(payload::encrypt_and_encode(
                EnvelopeType::Type1 {
                    sender_public_key: public_key,
                },
                plaintext,
                sym_key.as_bytes(),
            )?),
            SubscriptionKeys::Keypair(_) => Err(StoreError::NoKeys(topic.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::crypto::keys::Keypair};

    #[test]
    fn record_lifecycle() {
        let store: Subscription<u32> = Subscription::new("pending");
        let topic = Topic::generate();

        assert!(matches!(
            store.get(&topic),
            Err(StoreError::NotFound { context: "pending", .. })
        ));

        let keypair = Keypair::generate();
        let event = store.set(topic.clone(), 1, SubscriptionKeys::Keypair(keypair.clone()));
        assert!(matches!(event, StoreEvent::Created(1)));
        assert_eq!(store.get(&topic).unwrap(), 1);
        assert_eq!(store.len(), 1);

        let event = store.set(topic.clone(), 2, SubscriptionKeys::Keypair(keypair));
        assert!(matches!(event, StoreEvent::Updated(2)));

        let event = store.update(&topic, |value| *value = 3).unwrap();
        assert!(matches!(event, StoreEvent::Updated(3)));

        match store.delete(&topic, "settled").unwrap() {
            StoreEvent::Deleted { record, reason } => {
                assert_eq!(record, 3);
                assert_eq!(reason, "settled");
            }
            other => panic!("expected a deleted event, got {other:?}"),
        }
        assert!(store.is_empty());
        assert!(store.delete(&topic, "settled").is_err());
    }

    #[test]
    fn seal_and_open_with_shared_keys() {
        let store: Subscription<u32> = Subscription::new("settled");
        let us = Keypair::generate();
        let them = Keypair::generate();
        let shared = us.derive_shared_key(them.public_key()).unwrap();
        let topic = shared.derive_topic();

        store.set(
            topic.clone(),
            1,
            SubscriptionKeys::Shared {
                sym_key: shared,
                public_key: *us.public_key(),
            },
        );

        let sealed = store.seal(&topic, "plaintext").unwrap();
        assert_eq!(store.open(&topic, &sealed).unwrap(), "plaintext");
    }

    #[test]
    fn keypair_registration_cannot_seal() {
        let store: Subscription<u32> = Subscription::new("pending");
        let topic = Topic::generate();
        store.set(
            topic.clone(),
            1,
            SubscriptionKeys::Keypair(Keypair::generate()),
        );

        assert!(matches!(
            store.seal(&topic, "plaintext"),
            Err(StoreError::NoKeys(_))
        ));
    }
}
