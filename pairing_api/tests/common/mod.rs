//! In-memory relay hub for driving two controllers against each other.

use {
    async_trait::async_trait,
    pairing_api::{
        relay::{RelayClient, RelayError},
        ControllerConfig, PairingController,
    },
    pairing_rpc::domain::Topic,
    std::{
        collections::{BTreeSet, HashMap},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    },
    tokio::sync::mpsc,
};

type Inbox = mpsc::UnboundedSender<(Topic, String)>;

#[derive(Default)]
struct HubState {
    clients: Vec<Inbox>,
    routes: HashMap<Topic, BTreeSet<usize>>,
}

/// Routes published messages to every subscriber of the topic except the
/// publisher, the way a relay server would.
#[derive(Default)]
pub struct RelayHub {
    state: Mutex<HubState>,
}

impl RelayHub {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    fn connect(self: &Arc<Self>) -> (TestRelay, mpsc::UnboundedReceiver<(Topic, String)>) {
        let (inbox, receiver) = mpsc::unbounded_channel();
        let client = {
            let mut state = self.state.lock().unwrap();
            state.clients.push(inbox);
            state.clients.len() - 1
        };
        let relay = TestRelay {
            hub: self.clone(),
            client,
            published: AtomicUsize::new(0),
            fail_next_subscribe: Mutex::new(None),
        };
        (relay, receiver)
    }
}

pub struct TestRelay {
    hub: Arc<RelayHub>,
    client: usize,
    published: AtomicUsize,
    fail_next_subscribe: Mutex<Option<String>>,
}

impl TestRelay {
    /// Messages published by this client so far.
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Makes the next `subscribe` call fail with the given message.
    pub fn fail_next_subscribe(&self, message: &str) {
        *self.fail_next_subscribe.lock().unwrap() = Some(message.to_owned());
    }
}

#[async_trait]
impl RelayClient for TestRelay {
    async fn publish(
        &self,
        topic: Topic,
        message: String,
        _tag: u32,
        _ttl: Duration,
        _prompt: bool,
    ) -> Result<(), RelayError> {
        self.published.fetch_add(1, Ordering::SeqCst);

        let targets: Vec<Inbox> = {
            let state = self.hub.state.lock().unwrap();
            state
                .routes
                .get(&topic)
                .into_iter()
                .flatten()
                .filter(|subscriber| **subscriber != self.client)
                .filter_map(|subscriber| state.clients.get(*subscriber).cloned())
                .collect()
        };
        for target in targets {
            let _ = target.send((topic.clone(), message.clone()));
        }

        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<(), RelayError> {
        if let Some(message) = self.fail_next_subscribe.lock().unwrap().take() {
            return Err(RelayError::Subscription(message.into()));
        }

        self.hub
            .state
            .lock()
            .unwrap()
            .routes
            .entry(topic)
            .or_default()
            .insert(self.client);
        Ok(())
    }

    async fn unsubscribe(&self, topic: Topic) -> Result<(), RelayError> {
        if let Some(subscribers) = self.hub.state.lock().unwrap().routes.get_mut(&topic) {
            subscribers.remove(&self.client);
        }
        Ok(())
    }
}

pub struct TestPeer {
    pub controller: Arc<PairingController>,
    pub relay: Arc<TestRelay>,
}

/// Connects a controller to the hub and spawns the task draining inbound
/// messages into it.
pub fn spawn_peer(hub: &Arc<RelayHub>, config: ControllerConfig) -> TestPeer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let (relay, mut receiver) = hub.connect();
    let relay = Arc::new(relay);
    let controller = Arc::new(PairingController::new(relay.clone(), config));

    let driver = controller.clone();
    tokio::spawn(async move {
        while let Some((topic, message)) = receiver.recv().await {
            driver.handle_message(topic, message).await;
        }
    });

    TestPeer { controller, relay }
}
