//! # Connector
//!
//! Publishes [`Message`]s onto a bus and turns inbound frames back into
//! messages.
//!
//! ## Publish paths
//!
//! | path                 | sends                                                        |
//! |----------------------|--------------------------------------------------------------|
//! | direct, broadcast    | one envelope to the resolved subject                         |
//! | direct, directed     | one envelope per discovered host, independent sends          |
//! | federated, broadcast | one envelope per federation network, targeting the subject   |
//! | federated, directed  | hosts in chunks of 200, one envelope per chunk per federation |
//!
//! Replies always take the direct path; if the request came through a
//! broker its federation markup is re-attached so the broker can unwind it.
//!
//! Payloads are base64 encoded into the envelope and never interpreted on
//! the way.

use crate::{
    ConnectorContext, ConnectorError, EnvelopeBuilder, PublishError, Result, TargetResolver,
};
use bytes::Bytes;
use codec::Envelope;
use network::{ConnectOptions, Frame, Transport};
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{
    subjects::{self, SubjectInfo},
    FederationMarkup, Headers, Hop, Message, MessageKind, FEDERATION_BATCH_SIZE,
};

pub struct Connector {
    builder: EnvelopeBuilder,
    transport: Arc<dyn Transport>,
    options: ConnectOptions,
}

impl Connector {
    pub fn new(context: Arc<ConnectorContext>, transport: Arc<dyn Transport>) -> Self {
        let options = ConnectOptions::new(context.identity(), Vec::new());
        Self {
            builder: EnvelopeBuilder::new(TargetResolver::new(context)),
            transport,
            options,
        }
    }

    /// Servers, TLS and backoff used by [`connect`](Self::connect)
    pub fn with_connect_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context(&self) -> &ConnectorContext {
        self.builder.resolver().context()
    }

    pub fn resolver(&self) -> &TargetResolver {
        self.builder.resolver()
    }

    pub fn builder(&self) -> &EnvelopeBuilder {
        &self.builder
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub async fn connect(&self) -> Result<()> {
        info!(
            identity = %self.context().identity(),
            servers = ?self.options.servers,
            "Connecting"
        );
        self.transport.start(self.options.clone()).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.transport.stop().await?;
        Ok(())
    }

    /// Broadcast requests for `agent` on `network`
    pub async fn subscribe_agent(&self, agent: &str, network: &str) -> Result<()> {
        let subject = self
            .resolver()
            .resolve(agent, MessageKind::Broadcast, network, None)?;
        self.subscribe(&subject).await
    }

    /// Requests addressed to this node
    pub async fn subscribe_node(&self, network: &str) -> Result<()> {
        let subject = self
            .resolver()
            .resolve("", MessageKind::Directed, network, None)?;
        self.subscribe(&subject).await
    }

    /// Replies to requests this process sent
    pub async fn subscribe_replies(&self, network: &str) -> Result<()> {
        let subject = self.resolver().reply_subscription(network)?;
        self.subscribe(&subject).await
    }

    async fn subscribe(&self, subject: &str) -> Result<()> {
        self.transport.subscribe(subject, None).await?;
        debug!(subject, "Subscribed");
        Ok(())
    }

    pub async fn publish(&self, message: &Message) -> Result<()> {
        let federated = self.context().is_federated() && message.kind != MessageKind::Reply;

        match (federated, message.kind.is_directed()) {
            (false, false) => self.publish_direct(message).await,
            (false, true) => self.publish_direct_directed(message).await,
            (true, false) => self.publish_federated(message).await,
            (true, true) => self.publish_federated_directed(message).await,
        }
    }

    async fn publish_direct(&self, message: &Message) -> Result<()> {
        let server = self.transport.connected_server();
        let mut target = self.builder.target_for(message, None, server.as_deref())?;

        if let Some(markup) = message.request_federation() {
            target.headers.federation = Some(markup.clone());
        }

        let data = self.encode(&message.payload, &target.headers)?;
        self.send(&target.name, data, &message.request_id)
            .await
            .map_err(|failure| ConnectorError::Publish(vec![failure]))
    }

    async fn publish_direct_directed(&self, message: &Message) -> Result<()> {
        if message.discovered_hosts.is_empty() {
            debug!(request_id = %message.request_id, "Directed message has no hosts");
            return Ok(());
        }

        let server = self.transport.connected_server();
        let headers = self.builder.headers_for(message, server.as_deref())?;
        let data = self.encode(&message.payload, &headers)?;

        let mut failures = Vec::new();
        for host in &message.discovered_hosts {
            let subject = self.resolver().resolve(
                &message.agent,
                message.kind,
                &message.network,
                Some(host),
            )?;
            if let Err(failure) = self.send(&subject, data.clone(), &message.request_id).await {
                failures.push(failure);
            }
        }

        into_result(failures)
    }

    async fn publish_federated(&self, message: &Message) -> Result<()> {
        let server = self.transport.connected_server();
        let mut target = self.builder.target_for(message, None, server.as_deref())?;
        target.headers.federation = Some(FederationMarkup::new(
            message.request_id.clone(),
            vec![target.name.clone()],
        ));

        let data = self.encode(&message.payload, &target.headers)?;
        self.fan_out_federations(data, &message.request_id).await
    }

    async fn publish_federated_directed(&self, message: &Message) -> Result<()> {
        let server = self.transport.connected_server();
        let headers = self.builder.headers_for(message, server.as_deref())?;

        let mut failures = Vec::new();
        for chunk in message.discovered_hosts.chunks(FEDERATION_BATCH_SIZE) {
            let targets = chunk
                .iter()
                .map(|host| {
                    self.resolver().resolve(
                        &message.agent,
                        message.kind,
                        &message.network,
                        Some(host),
                    )
                })
                .collect::<Result<Vec<_>>>()?;

            let mut chunk_headers = headers.clone();
            chunk_headers.federation =
                Some(FederationMarkup::new(message.request_id.clone(), targets));

            let data = self.encode(&message.payload, &chunk_headers)?;
            if let Err(err) = self.fan_out_federations(data, &message.request_id).await {
                match err {
                    ConnectorError::Publish(chunk_failures) => failures.extend(chunk_failures),
                    other => return Err(other),
                }
            }
        }

        into_result(failures)
    }

    /// Send the same envelope to every federation network's ingress
    async fn fan_out_federations(&self, data: Bytes, request_id: &str) -> Result<()> {
        let mut failures = Vec::new();
        for federation in self.context().federations() {
            let ingress = subjects::federation_ingress(federation);
            if let Err(failure) = self.send(&ingress, data.clone(), request_id).await {
                failures.push(failure);
            }
        }
        into_result(failures)
    }

    fn encode(&self, payload: &[u8], headers: &Headers) -> Result<Bytes> {
        let bytes = Envelope::new(payload, headers.clone()).to_bytes()?;
        Ok(Bytes::from(bytes))
    }

    async fn send(
        &self,
        subject: &str,
        data: Bytes,
        request_id: &str,
    ) -> std::result::Result<(), PublishError> {
        debug!(subject, request_id, bytes = data.len(), "Publishing");
        self.transport
            .publish(subject, data, None)
            .await
            .map_err(|source| {
                warn!(subject, request_id, error = %source, "Publish failed");
                PublishError {
                    target: subject.to_string(),
                    source,
                }
            })
    }

    /// Next decodable message. Undecodable frames are logged and skipped;
    /// only a closed transport ends the loop.
    pub async fn receive(&self) -> Result<Message> {
        loop {
            let frame = match self.transport.receive().await {
                Ok(frame) => frame,
                Err(e) if e.is_closed() => return Err(ConnectorError::ConnectionClosed),
                Err(e) => return Err(e.into()),
            };

            let subject = frame.subject.clone();
            let size = frame.data.len();
            match self.decode(frame) {
                Ok(message) => return Ok(message),
                Err(e) => warn!(subject = %subject, size, error = %e, "Discarding undecodable frame"),
            }
        }
    }

    fn decode(&self, frame: Frame) -> Result<Message> {
        let envelope = Envelope::from_slice(&frame.data)?;
        let payload = envelope.payload()?;
        let mut headers = envelope.headers;

        let server = self.transport.connected_server().unwrap_or_default();
        headers.record_hop(Hop::pair(server, self.context().identity()));

        let (kind, network, agent) = match SubjectInfo::parse(&frame.subject) {
            Some(info) => (info.kind, info.network, info.agent.unwrap_or_default()),
            None => {
                debug!(subject = %frame.subject, "Unclassified subject");
                (
                    MessageKind::Request,
                    self.context().main_network().unwrap_or_default().to_string(),
                    String::new(),
                )
            }
        };

        let request_id = headers
            .federation
            .as_ref()
            .and_then(|markup| markup.req.clone())
            .unwrap_or_default();
        let reply_to = headers.reply_to.clone().or(frame.reply_to);

        Ok(Message {
            kind,
            agent,
            network,
            payload,
            request_id,
            reply_to,
            discovered_hosts: Vec::new(),
            headers,
            request: None,
        })
    }
}

fn into_result(failures: Vec<PublishError>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ConnectorError::Publish(failures))
    }
}
