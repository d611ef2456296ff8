//! Inbound message routing.
//!
//! A message is classified by which store owns its topic, decrypted at the
//! store boundary, then dispatched. Events for a single topic are processed
//! in the order the relay delivers them; nothing here reorders.

use {
    super::{DeleteSource, PairingController, PairingEvent},
    crate::{
        crypto::keys::decode_public_key,
        error::Error,
        pairing::{PendingPairing, SettledPairing},
        store::StoreEvent,
    },
    pairing_rpc::{
        domain::{MessageId, Topic},
        rpc::{
            error_code, AppPayload, ErrorParams, IrnMetadata, OutcomeSuccess, PairingOutcome,
            Payload, RelayProtocolMetadata, Request, RequestParams, Response, ResponseParams,
            ResponseParamsError, ResponseParamsSuccess, REASON_ACKNOWLEDGED, RESERVED_METHODS,
        },
    },
    tracing::{debug, warn},
};

impl PairingController {
    /// Entry point for inbound relay messages.
    ///
    /// Protocol errors are recovered here (logged, and where the protocol
    /// says so, answered with a JSON-RPC error); they never crash the
    /// controller.
    pub async fn handle_message(&self, topic: Topic, message: String) {
        if let Err(err) = self.process_message(&topic, &message).await {
            warn!(%topic, error = %err, "failed to process inbound message");
        }
    }

    async fn process_message(&self, topic: &Topic, message: &str) -> Result<(), Error> {
        if self.pending.contains(topic) {
            let plain = self.pending.open(topic, message)?;
            self.process_pending_payload(topic, &plain).await
        } else if self.settled.contains(topic) {
            let plain = self.settled.open(topic, message)?;
            self.process_settled_payload(topic, &plain).await
        } else {
            debug!(%topic, "inbound message on an unknown topic, dropping");
            Ok(())
        }
    }

    async fn process_pending_payload(&self, topic: &Topic, plain: &str) -> Result<(), Error> {
        match serde_json::from_str::<Payload>(plain)? {
            Payload::Request(request) => match request.params {
                RequestParams::PairingRespond(outcome) => {
                    self.on_response(topic, request.id, outcome).await
                }
                _ => {
                    warn!(%topic, "unexpected request method on a pending topic, dropping");
                    Ok(())
                }
            },
            Payload::Response(response) => self.on_acknowledge(topic, response).await,
        }
    }

    /// The responder's answer arrived on the proposal topic.
    ///
    /// A failure moves the pending record to `Responded`/failure. A success
    /// mirrors the settlement with our stored keypair and the
    /// proposer-inherited permissions, acknowledges with a JSON-RPC result,
    /// and resolves the waiting `create`. A local settlement error turns
    /// into `Responded`/failure plus a JSON-RPC error acknowledgement.
    async fn on_response(
        &self,
        topic: &Topic,
        id: MessageId,
        outcome: PairingOutcome,
    ) -> Result<(), Error> {
        let pending = self.pending.get(topic)?;

        match outcome {
            PairingOutcome::Failure(failure) => {
                let event = self.pending.update(topic, |record| {
                    *record = record
                        .clone()
                        .with_outcome(PairingOutcome::Failure(failure.clone()));
                })?;
                self.emit_pending(&event);
                self.resolve_completion(topic, Err(Error::RemoteFailure(failure.reason)));
                Ok(())
            }
            PairingOutcome::Success(success) => match self.settle_response(&pending, &success).await {
                Ok(settled_event) => {
                    let event = self.pending.update(topic, |record| {
                        *record = record
                            .clone()
                            .with_outcome(PairingOutcome::Success(success.clone()));
                    })?;
                    self.emit_pending(&event);
                    self.emit_settled(&settled_event);

                    let params = ResponseParamsSuccess::PairingRespond(true);
                    if let Err(err) = self
                        .acknowledge(topic, id, &pending, &success, params.try_into()?)
                        .await
                    {
                        warn!(%topic, error = %err, "failed to publish acknowledgement");
                    }

                    self.resolve_completion(topic, Ok(success));
                    Ok(())
                }
                Err(err) => {
                    let reason = match &err {
                        Error::SettlementFailure(reason) => reason.clone(),
                        other => other.to_string(),
                    };
                    let event = self.pending.update(topic, |record| {
                        *record = record
                            .clone()
                            .with_outcome(PairingOutcome::failure(reason.clone()));
                    })?;
                    self.emit_pending(&event);

                    let params = ResponseParamsError::PairingRespond(ErrorParams {
                        code: None,
                        message: Some(reason.clone()),
                    });
                    if let Err(ack_err) = self
                        .acknowledge(topic, id, &pending, &success, params.try_into()?)
                        .await
                    {
                        warn!(%topic, error = %ack_err, "failed to publish error acknowledgement");
                    }

                    self.resolve_completion(topic, Err(Error::SettlementFailure(reason)));
                    Ok(())
                }
            },
        }
    }

    /// Mirrors the responder's settlement locally, verifying that the
    /// advertised settled topic matches our own key derivation.
    async fn settle_response(
        &self,
        pending: &PendingPairing,
        success: &OutcomeSuccess,
    ) -> Result<StoreEvent<SettledPairing>, Error> {
        let responder_key = decode_public_key(&success.responder.public_key)?;
        let shared_key = pending.keypair().derive_shared_key(&responder_key)?;
        if shared_key.derive_topic() != success.topic {
            return Err(Error::SettlementFailure(
                "settled topic does not match the shared key".to_owned(),
            ));
        }

        let (_, event) = self
            .settle(
                success.relay.clone(),
                pending.keypair().clone(),
                success.responder.clone(),
                pending.proposal().permissions.clone(),
                success.expiry,
            )
            .await?;
        Ok(event)
    }

    /// Publishes the acknowledgement on the proposal topic, sealed for the
    /// responder with explicit keys.
    async fn acknowledge(
        &self,
        topic: &Topic,
        id: MessageId,
        pending: &PendingPairing,
        success: &OutcomeSuccess,
        params: ResponseParams,
    ) -> Result<(), Error> {
        let responder_key = decode_public_key(&success.responder.public_key)?;
        let shared_key = pending.keypair().derive_shared_key(&responder_key)?;
        let irn = ResponseParamsSuccess::PairingRespond(true).irn_metadata();
        self.publish_response_with_keys(
            topic.clone(),
            id,
            irn,
            params,
            &shared_key,
            pending.keypair().public_key(),
        )
        .await
    }

    /// A JSON-RPC response arrived on the proposal topic: the proposer has
    /// acknowledged our answer.
    ///
    /// An error response after a successful settlement tears the settled
    /// record down with the peer-supplied message. Either way the pending
    /// record is reaped; a missing pending (late acknowledgement) is
    /// tolerated.
    async fn on_acknowledge(&self, topic: &Topic, response: Response) -> Result<(), Error> {
        let Ok(pending) = self.pending.get(topic) else {
            debug!(%topic, "late acknowledgement for an unknown pending topic");
            return Ok(());
        };

        if let Some(PairingOutcome::Success(success)) = pending.outcome() {
            if let ResponseParams::Err(value) = &response.params {
                let params: ErrorParams = serde_json::from_value(value.clone())?;
                let message = params
                    .message
                    .unwrap_or_else(|| "acknowledgement rejected".to_owned());
                let failure = Error::Acknowledgement(message.clone());
                warn!(%topic, error = %failure, "tearing down the settled pairing");
                if let Err(err) = self
                    .delete_settled(&success.topic, &message, DeleteSource::Local)
                    .await
                {
                    debug!(topic = %success.topic, error = %err, "settled record already gone");
                }
            }
        }

        self.reap_pending(topic, REASON_ACKNOWLEDGED).await;
        Ok(())
    }

    async fn process_settled_payload(&self, topic: &Topic, plain: &str) -> Result<(), Error> {
        let value: serde_json::Value = serde_json::from_str(plain)?;

        if value.get("method").is_some() {
            match serde_json::from_value::<Request>(value.clone()) {
                Ok(request) => self.on_settled_request(topic, request).await,
                Err(_) => self.on_unknown_method(topic, &value).await,
            }
        } else {
            // Non-request payloads surface verbatim.
            let payload: AppPayload = serde_json::from_value(value)?;
            self.emit(PairingEvent::Payload {
                topic: topic.clone(),
                payload,
            });
            Ok(())
        }
    }

    async fn on_settled_request(&self, topic: &Topic, request: Request) -> Result<(), Error> {
        match request.params {
            RequestParams::PairingPayload(params) => {
                self.on_payload(topic, request.id, params.payload).await
            }
            RequestParams::PairingUpdate(params) => {
                let peer_key = self.settled.get(topic)?.peer.public_key;
                match self.handle_update(topic, params.update, &peer_key) {
                    Ok(_) => {
                        let params = ResponseParamsSuccess::PairingUpdate(true);
                        let irn = params.irn_metadata();
                        self.publish_settled_response(topic, request.id, irn, params.try_into()?)
                            .await
                    }
                    Err(err) => {
                        warn!(%topic, error = %err, "rejecting pairing update");
                        let params = ResponseParamsError::PairingUpdate(ErrorParams {
                            code: Some(error_code::INVALID_UPDATE),
                            message: Some(err.to_string()),
                        });
                        let irn = params.irn_metadata();
                        self.publish_settled_response(topic, request.id, irn, params.try_into()?)
                            .await
                    }
                }
            }
            RequestParams::PairingDelete(params) => {
                self.delete_settled(topic, &params.reason, DeleteSource::Remote)
                    .await
            }
            RequestParams::PairingRespond(_) => {
                warn!(%topic, "pairing_respond received on a settled topic, dropping");
                Ok(())
            }
        }
    }

    /// An application request wrapped in `pairing_payload`.
    ///
    /// Requests are honoured only if their method is whitelisted by the
    /// pairing permissions or reserved by the pairing protocol itself;
    /// anything else is answered with a JSON-RPC error and causes no state
    /// change. Honoured payloads surface as the external `payload` event.
    async fn on_payload(
        &self,
        topic: &Topic,
        id: MessageId,
        payload: AppPayload,
    ) -> Result<(), Error> {
        if let AppPayload::Request(request) = &payload {
            let settled = self.settled.get(topic)?;
            let reserved = RESERVED_METHODS.contains(&request.method.as_str());
            if !reserved && !settled.permissions.permits(&request.method) {
                let rejection = Error::Unauthorized(request.method.clone());
                warn!(%topic, error = %rejection, "rejecting pairing payload");
                let params = ResponseParamsError::PairingPayload(ErrorParams {
                    code: Some(error_code::UNAUTHORIZED_METHOD),
                    message: Some(rejection.to_string()),
                });
                let irn = params.irn_metadata();
                return self
                    .publish_settled_response(topic, id, irn, params.try_into()?)
                    .await;
            }
        }

        self.emit(PairingEvent::Payload {
            topic: topic.clone(),
            payload,
        });
        Ok(())
    }

    /// A well-formed request for a method outside the pairing protocol.
    async fn on_unknown_method(
        &self,
        topic: &Topic,
        value: &serde_json::Value,
    ) -> Result<(), Error> {
        let method = value
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_owned();
        warn!(%topic, %method, "unknown JSON-RPC method requested");

        if let Some(id) = value.get("id").and_then(serde_json::Value::as_u64) {
            let params = ResponseParamsError::PairingPayload(ErrorParams {
                code: Some(error_code::UNKNOWN_METHOD),
                message: Some(format!("Unknown JSON-RPC Method Requested: {method}")),
            });
            let irn = params.irn_metadata();
            self.publish_settled_response(topic, MessageId::new(id), irn, params.try_into()?)
                .await?;
        }
        Ok(())
    }

    /// Publishes a response on a settled topic, sealed by the store.
    async fn publish_settled_response(
        &self,
        topic: &Topic,
        id: MessageId,
        irn: IrnMetadata,
        params: ResponseParams,
    ) -> Result<(), Error> {
        let response = Response::new(id, params);
        let payload = serde_json::to_string(&Payload::from(response))?;
        let message = self.settled.seal(topic, &payload)?;
        self.publish(topic.clone(), message, irn).await
    }
}
