//! The pairing state machine and its public operations.

mod inbound;

use {
    crate::{
        config::ControllerConfig,
        crypto::{
            keys::{self, Keypair, SharedKey},
            payload::{encrypt_and_encode, EnvelopeType, PubKey},
        },
        error::Error,
        pairing::{PendingPairing, ProposedPairing, RespondedPairing, SettledPairing},
        relay::RelayClient,
        store::{StoreEvent, Subscription, SubscriptionKeys},
    },
    chrono::Utc,
    dashmap::DashMap,
    pairing_rpc::{
        domain::{MessageId, Topic},
        rpc::{
            AppPayload, IrnMetadata, JsonRpcPermissions, OutcomeSuccess, PairingDeleteRequest,
            PairingOutcome, PairingPayloadRequest, PairingPermissions, PairingProposal,
            PairingSignal, PairingUpdate, PairingUpdateRequest, Payload, Peer, PeerUpdate, Relay,
            RelayProtocolMetadata, Request, RequestParams, Response, ResponseParams,
            REASON_SETTLED,
        },
        uri::PairingUri,
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::{broadcast, oneshot},
    tracing::{debug, warn},
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// External lifecycle events. Each carries a defensive copy of the record
/// it concerns.
#[derive(Debug, Clone)]
pub enum PairingEvent {
    Proposed(PendingPairing),
    Responded(PendingPairing),
    Settled(SettledPairing),
    Updated(SettledPairing),
    Deleted {
        pairing: SettledPairing,
        reason: String,
    },
    Payload {
        topic: Topic,
        payload: AppPayload,
    },
}

/// Where a settled deletion originated. Remote-initiated deletions suppress
/// the `pairing_delete` echo publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteSource {
    Local,
    Remote,
}

#[derive(Debug, Default)]
pub struct CreateParams {
    pub relay: Option<Relay>,
}

#[derive(Debug)]
pub struct RespondParams {
    pub approved: bool,
    pub proposal: PairingProposal,
}

#[derive(Debug)]
pub struct UpdateParams {
    pub topic: Topic,
    pub update: PairingUpdate,
}

#[derive(Debug)]
pub struct DeleteParams {
    pub topic: Topic,
    pub reason: String,
}

/// Protocol state machine for end-to-end-encrypted pairings over an
/// untrusted relay.
///
/// The controller owns the pending and settled stores exclusively; external
/// consumers observe them through the event surface and the read accessors.
pub struct PairingController {
    config: ControllerConfig,
    relay: Arc<dyn RelayClient>,
    pending: Subscription<PendingPairing>,
    settled: Subscription<SettledPairing>,
    /// Completion handles for in-flight `create` calls, keyed by proposal
    /// topic. Resolved by the inbound router, unregistered on first match,
    /// which makes double resolution impossible.
    completions: DashMap<Topic, oneshot::Sender<Result<OutcomeSuccess, Error>>>,
    events: broadcast::Sender<PairingEvent>,
}

impl PairingController {
    pub fn new(relay: Arc<dyn RelayClient>, config: ControllerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            relay,
            pending: Subscription::new("pending"),
            settled: Subscription::new("settled"),
            completions: DashMap::new(),
            events,
        }
    }

    /// Subscribes to the external event surface.
    pub fn events(&self) -> broadcast::Receiver<PairingEvent> {
        self.events.subscribe()
    }

    /// Re-establishes relay subscriptions for every record already held by
    /// the stores.
    pub async fn init(&self) -> Result<(), Error> {
        for record in self.pending.entries() {
            self.relay.subscribe(record.topic().clone()).await?;
        }
        for record in self.settled.entries() {
            self.relay.subscribe(record.topic.clone()).await?;
        }
        Ok(())
    }

    /// Proposes a fresh pairing and resolves once the responder has
    /// answered.
    ///
    /// On approval the settled record is returned and the pending record is
    /// reaped with reason `settled`; on failure the pending record is reaped
    /// with the outcome reason and the call fails with it. Resolution
    /// happens exactly once per proposal. There is no built-in cancel;
    /// callers wrapping this in a timeout may `delete` the pending topic.
    pub async fn create(&self, params: CreateParams) -> Result<SettledPairing, Error> {
        let (pending, event) = self.propose(params.relay);
        let topic = pending.topic().clone();

        let (completion, resolved) = oneshot::channel();
        self.completions.insert(topic.clone(), completion);

        if let Err(err) = self.relay.subscribe(topic.clone()).await {
            self.completions.remove(&topic);
            self.reap_pending(&topic, "proposal subscription failed").await;
            return Err(err.into());
        }

        // Announced only once the relay listens, so that a responder acting
        // on the signal cannot answer into the void.
        self.emit_pending(&event);

        match resolved.await.map_err(|_| Error::ProposalAbandoned)? {
            Ok(success) => {
                let settled = self.settled.get(&success.topic)?;
                self.reap_pending(&topic, REASON_SETTLED).await;
                Ok(settled)
            }
            Err(err) => {
                let reason = match &err {
                    Error::RemoteFailure(reason) => reason.clone(),
                    Error::SettlementFailure(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.reap_pending(&topic, &reason).await;
                Err(err)
            }
        }
    }

    /// Builds the proposal and records it as `Proposed`. Does not block on
    /// settlement.
    fn propose(&self, relay: Option<Relay>) -> (PendingPairing, StoreEvent<PendingPairing>) {
        let relay = relay.unwrap_or_else(|| self.config.relay.clone());
        let topic = Topic::generate();
        let keypair = Keypair::generate();

        let uri = PairingUri::new(topic.clone(), &relay, *keypair.public_key());
        let proposal = PairingProposal {
            topic: topic.clone(),
            relay: relay.clone(),
            proposer: Peer {
                public_key: keypair.public_key_hex(),
                metadata: self.config.metadata.clone(),
            },
            signal: PairingSignal::uri(uri.to_string()),
            permissions: PairingPermissions {
                jsonrpc: JsonRpcPermissions {
                    methods: self.config.proposed_methods.clone(),
                },
            },
            ttl: self.config.ttl,
        };

        let record = PendingPairing::Proposed(ProposedPairing {
            topic: topic.clone(),
            relay,
            keypair: keypair.clone(),
            proposal,
        });
        let event = self
            .pending
            .set(topic, record.clone(), SubscriptionKeys::Keypair(keypair));

        (record, event)
    }

    /// Answers a proposal received out of band.
    ///
    /// A fresh keypair is generated either way. Approval settles the
    /// pairing and produces a success outcome; refusal or a settlement
    /// failure produce a failure outcome. The `Responded` pending record is
    /// written first so that the durable state reflects the answer before
    /// the `pairing_respond` wire message goes out.
    pub async fn respond(&self, params: RespondParams) -> Result<PendingPairing, Error> {
        let RespondParams { approved, proposal } = params;
        let keypair = Keypair::generate();

        let (outcome, settled_event) = if approved {
            match self.settle_from_proposal(&proposal, &keypair).await {
                Ok((settled, event)) => {
                    let success = OutcomeSuccess {
                        topic: settled.topic.clone(),
                        relay: settled.relay.clone(),
                        responder: Peer {
                            public_key: keypair.public_key_hex(),
                            metadata: self.config.metadata.clone(),
                        },
                        expiry: settled.expiry,
                    };
                    (PairingOutcome::Success(success), Some(event))
                }
                Err(err) => {
                    warn!(topic = %proposal.topic, error = %err, "pairing settlement failed");
                    (PairingOutcome::failure(err.to_string()), None)
                }
            }
        } else {
            (PairingOutcome::failure(pairing_rpc::rpc::REASON_NOT_APPROVED), None)
        };

        let record = PendingPairing::Responded(RespondedPairing {
            topic: proposal.topic.clone(),
            relay: proposal.relay.clone(),
            keypair: keypair.clone(),
            proposal: proposal.clone(),
            outcome: outcome.clone(),
        });
        let event = self.pending.set(
            proposal.topic.clone(),
            record.clone(),
            SubscriptionKeys::Keypair(keypair.clone()),
        );
        self.emit_pending(&event);
        if let Some(settled_event) = &settled_event {
            self.emit_settled(settled_event);
        }

        // Listen for the proposer's acknowledgement.
        self.relay.subscribe(proposal.topic.clone()).await?;

        // The answer is encrypted to the proposer's public key; no shared
        // state exists on the proposal topic, so the keys are explicit.
        let proposer_key = keys::decode_public_key(&proposal.proposer.public_key)?;
        let shared_key = keypair.derive_shared_key(&proposer_key)?;
        self.publish_request_with_keys(
            proposal.topic.clone(),
            RequestParams::PairingRespond(outcome.clone()),
            &shared_key,
            keypair.public_key(),
        )
        .await?;

        if let PairingOutcome::Failure(failure) = &outcome {
            // Failures are never acknowledged; reap immediately.
            self.reap_pending(&proposal.topic, &failure.reason).await;
        }

        Ok(record)
    }

    /// Settles a pairing against the proposal, deriving the expiry from the
    /// proposal ttl.
    async fn settle_from_proposal(
        &self,
        proposal: &PairingProposal,
        keypair: &Keypair,
    ) -> Result<(SettledPairing, StoreEvent<SettledPairing>), Error> {
        let expiry = Utc::now().timestamp() as u64 + proposal.ttl;
        self.settle(
            proposal.relay.clone(),
            keypair.clone(),
            proposal.proposer.clone(),
            proposal.permissions.clone(),
            expiry,
        )
        .await
    }

    /// Derives the shared key and the settled topic, then records the
    /// settled pairing with its decryption keys attached.
    ///
    /// Idempotent on identical inputs: the derived topic is a pure function
    /// of the key material, so re-settling overwrites the record with an
    /// equal value. Emission of the resulting store event is left to the
    /// caller so that `responded` precedes `settled` on the event surface.
    pub(crate) async fn settle(
        &self,
        relay: Relay,
        keypair: Keypair,
        peer: Peer,
        permissions: PairingPermissions,
        expiry: u64,
    ) -> Result<(SettledPairing, StoreEvent<SettledPairing>), Error> {
        let peer_public = keys::decode_public_key(&peer.public_key)?;
        let shared_key = keypair.derive_shared_key(&peer_public)?;
        let topic = shared_key.derive_topic();

        self.relay.subscribe(topic.clone()).await?;

        let settled = SettledPairing {
            topic: topic.clone(),
            relay,
            shared_key: shared_key.clone(),
            keypair: keypair.clone(),
            peer,
            permissions,
            expiry,
        };
        let event = self.settled.set(
            topic,
            settled.clone(),
            SubscriptionKeys::Shared {
                sym_key: shared_key,
                public_key: *keypair.public_key(),
            },
        );

        Ok((settled, event))
    }

    /// Updates the peer metadata of a settled pairing.
    ///
    /// Optimistic: the change is applied locally under our own key and
    /// published; the record as of the local write is returned without
    /// awaiting the peer's acknowledgement.
    pub async fn update(&self, params: UpdateParams) -> Result<SettledPairing, Error> {
        let UpdateParams { topic, update } = params;
        let mutator = self.settled.get(&topic)?.keypair.public_key_hex();
        let update = self.handle_update(&topic, update, &mutator)?;

        self.publish_request(
            topic.clone(),
            RequestParams::PairingUpdate(PairingUpdateRequest { update }),
        )
        .await?;

        self.settled.get(&topic).map_err(Into::into)
    }

    /// Validates and applies a metadata update on behalf of `mutator`.
    ///
    /// Only `update.peer.metadata` is accepted. A mutator equal to the
    /// recorded peer copies the metadata into the record; our own key
    /// applies the same write optimistically, relying on the peer to mirror
    /// it. Any other mutator is rejected.
    pub(crate) fn handle_update(
        &self,
        topic: &Topic,
        update: PairingUpdate,
        mutator_public_key: &str,
    ) -> Result<PairingUpdate, Error> {
        let settled = self.settled.get(topic)?;
        let metadata = update.peer.ok_or(Error::InvalidUpdate)?.metadata;

        let is_peer = mutator_public_key == settled.peer.public_key;
        let is_self = mutator_public_key == settled.keypair.public_key_hex();
        if !is_peer && !is_self {
            return Err(Error::InvalidUpdate);
        }

        let peer = Peer {
            public_key: settled.peer.public_key,
            metadata: Some(metadata.clone()),
        };
        let event = self.settled.update(topic, |record| record.peer = peer)?;
        self.emit_settled(&event);

        Ok(PairingUpdate {
            peer: Some(PeerUpdate { metadata }),
        })
    }

    /// Deletes a settled pairing and propagates the reason to the peer.
    pub async fn delete(&self, params: DeleteParams) -> Result<(), Error> {
        self.delete_settled(&params.topic, &params.reason, DeleteSource::Local)
            .await
    }

    pub(crate) async fn delete_settled(
        &self,
        topic: &Topic,
        reason: &str,
        source: DeleteSource,
    ) -> Result<(), Error> {
        let event = self.settled.delete(topic, reason)?;
        self.unsubscribe_quiet(topic).await;
        self.emit_settled(&event);

        if let (DeleteSource::Local, StoreEvent::Deleted { record, reason }) = (source, &event) {
            let params = RequestParams::PairingDelete(PairingDeleteRequest {
                reason: reason.clone(),
            });
            // Best-effort: the local record is already gone and there is no
            // caller to hand the failure to.
            if let Err(err) = self
                .publish_request_with_keys(
                    topic.clone(),
                    params,
                    &record.shared_key,
                    record.keypair.public_key(),
                )
                .await
            {
                warn!(%topic, error = %err, "failed to publish pairing_delete");
            }
        }

        Ok(())
    }

    pub fn get(&self, topic: &Topic) -> Result<SettledPairing, Error> {
        self.settled.get(topic).map_err(Into::into)
    }

    pub fn entries(&self) -> Vec<SettledPairing> {
        self.settled.entries()
    }

    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }

    /// Number of proposals still straddling the handshake.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Relays an application payload over the settled topic, wrapped in
    /// `pairing_payload`. Publish failures surface to the caller.
    pub async fn send(&self, topic: Topic, payload: AppPayload) -> Result<(), Error> {
        let _ = self.settled.get(&topic)?;
        self.publish_request(
            topic,
            RequestParams::PairingPayload(PairingPayloadRequest { payload }),
        )
        .await
    }

    /// Rebuilds the proposal a URI signal stands for, using this
    /// controller's configured defaults for the permissions and ttl the
    /// signal does not carry.
    pub fn proposal_from_uri(&self, uri: &PairingUri) -> PairingProposal {
        PairingProposal {
            topic: uri.topic.clone(),
            relay: uri.relay(),
            proposer: Peer {
                public_key: hex::encode(uri.params.public_key),
                metadata: None,
            },
            signal: PairingSignal::uri(uri.to_string()),
            permissions: PairingPermissions {
                jsonrpc: JsonRpcPermissions {
                    methods: self.config.proposed_methods.clone(),
                },
            },
            ttl: self.config.ttl,
        }
    }

    /// Deletes a pending record, tolerating records already gone (late
    /// acknowledgements race local reaping).
    pub(crate) async fn reap_pending(&self, topic: &Topic, reason: &str) {
        match self.pending.delete(topic, reason) {
            Ok(_) => self.unsubscribe_quiet(topic).await,
            Err(err) => debug!(%topic, error = %err, "pending record already reaped"),
        }
    }

    async fn unsubscribe_quiet(&self, topic: &Topic) {
        if let Err(err) = self.relay.unsubscribe(topic.clone()).await {
            warn!(%topic, error = %err, "failed to unsubscribe from relay topic");
        }
    }

    pub(crate) fn resolve_completion(
        &self,
        topic: &Topic,
        result: Result<OutcomeSuccess, Error>,
    ) {
        if let Some((_, completion)) = self.completions.remove(topic) {
            // The waiting `create` may have been dropped meanwhile.
            let _ = completion.send(result);
        }
    }

    pub(crate) fn emit(&self, event: PairingEvent) {
        // An absent or lagging subscriber must not fail the state machine.
        let _ = self.events.send(event);
    }

    pub(crate) fn emit_pending(&self, event: &StoreEvent<PendingPairing>) {
        match event {
            StoreEvent::Created(record) | StoreEvent::Updated(record) => {
                if record.is_responded() {
                    self.emit(PairingEvent::Responded(record.clone()));
                } else {
                    self.emit(PairingEvent::Proposed(record.clone()));
                }
            }
            // Reaped pending records have no external event.
            StoreEvent::Deleted { .. } => {}
        }
    }

    pub(crate) fn emit_settled(&self, event: &StoreEvent<SettledPairing>) {
        match event {
            StoreEvent::Created(record) => self.emit(PairingEvent::Settled(record.clone())),
            StoreEvent::Updated(record) => self.emit(PairingEvent::Updated(record.clone())),
            StoreEvent::Deleted { record, reason } => self.emit(PairingEvent::Deleted {
                pairing: record.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Publishes a request on a settled topic, sealed by the store.
    pub(crate) async fn publish_request(
        &self,
        topic: Topic,
        params: RequestParams,
    ) -> Result<(), Error> {
        let irn = params.irn_metadata();
        let request = Request::new(params);
        let payload = serde_json::to_string(&Payload::from(request))?;
        let message = self.settled.seal(&topic, &payload)?;
        self.publish(topic, message, irn).await
    }

    /// Publishes a request sealed with explicit keys; used on proposal
    /// topics and for the delete echo, where the stores hold no sealing
    /// keys.
    pub(crate) async fn publish_request_with_keys(
        &self,
        topic: Topic,
        params: RequestParams,
        shared_key: &SharedKey,
        sender_public_key: &PubKey,
    ) -> Result<(), Error> {
        let irn = params.irn_metadata();
        let request = Request::new(params);
        let payload = serde_json::to_string(&Payload::from(request))?;
        let message = encrypt_and_encode(
            EnvelopeType::Type1 { sender_public_key },
            &payload,
            shared_key.as_bytes(),
        )?;
        self.publish(topic, message, irn).await
    }

    /// Publishes a response sealed with explicit keys on a proposal topic.
    pub(crate) async fn publish_response_with_keys(
        &self,
        topic: Topic,
        id: MessageId,
        irn: IrnMetadata,
        params: ResponseParams,
        shared_key: &SharedKey,
        sender_public_key: &PubKey,
    ) -> Result<(), Error> {
        let response = Response::new(id, params);
        let payload = serde_json::to_string(&Payload::from(response))?;
        let message = encrypt_and_encode(
            EnvelopeType::Type1 { sender_public_key },
            &payload,
            shared_key.as_bytes(),
        )?;
        self.publish(topic, message, irn).await
    }

    pub(crate) async fn publish(
        &self,
        topic: Topic,
        message: String,
        irn: IrnMetadata,
    ) -> Result<(), Error> {
        self.relay
            .publish(
                topic,
                message,
                irn.tag,
                Duration::from_secs(irn.ttl),
                irn.prompt,
            )
            .await?;
        Ok(())
    }
}
