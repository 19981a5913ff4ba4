// 集成测试公共工具
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flare_push_channel::{
    Channel, ChannelConfig, ChannelMetrics, ChannelTasks, CloseReason, EventDispatcher,
    MemoryTransport, Message, OverflowRegistry,
};

pub const OPEN_FRAME: &str =
    r#"0{"sid":"sid-1","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":60000}"#;

/// 记录事件顺序的分发器
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
    reasons: Mutex<Vec<CloseReason>>,
    messages: Mutex<Vec<Message>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<CloseReason> {
        self.reasons.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventDispatcher for Recorder {
    async fn on_connect(&self, channel: Arc<Channel>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("connect:{}", channel.id()));
    }

    async fn on_disconnect(&self, _channel: Arc<Channel>, reason: CloseReason) {
        self.events
            .lock()
            .unwrap()
            .push(format!("disconnect:{}", reason.label()));
        self.reasons.lock().unwrap().push(reason);
    }

    async fn on_message(&self, _channel: Arc<Channel>, message: Message) {
        self.events
            .lock()
            .unwrap()
            .push(format!("message:{}", message.method));
        self.messages.lock().unwrap().push(message);
    }
}

pub struct Harness {
    pub channel: Arc<Channel>,
    pub server: Arc<MemoryTransport>,
    pub peer: MemoryTransport,
    pub recorder: Arc<Recorder>,
    pub overflow: Arc<OverflowRegistry>,
}

impl Harness {
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_heartbeat(config, Duration::from_secs(25))
    }

    pub fn with_heartbeat(config: ChannelConfig, interval: Duration) -> Self {
        let _ = tracing_subscriber::fmt::try_init();

        let (server, peer) = MemoryTransport::pair(interval, Duration::from_secs(60));
        let server = Arc::new(server);
        let recorder = Arc::new(Recorder::default());
        let overflow = Arc::new(OverflowRegistry::new());
        let channel = Channel::new(
            server.clone(),
            recorder.clone(),
            overflow.clone(),
            Arc::new(ChannelMetrics::unregistered()),
            config,
        );
        Self {
            channel,
            server,
            peer,
            recorder,
            overflow,
        }
    }

    pub fn start(&self) -> ChannelTasks {
        self.channel.spawn_pumps()
    }
}

/// 轮询直到条件成立
pub async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
