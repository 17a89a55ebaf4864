use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{debug, info, warn};

use thermostat_common::{
    AttributeDispatcher, ConnectivityEvent, ConnectivityReducer, ConnectivityTransition,
    DeviceSnapshot, DeviceStateStore, DispatchOutcome, DisplaySnapshot, Presenter, RuntimeConfig,
    ThermostatLimits, TOPIC_ACTUATOR_STATE, TOPIC_ATTRIBUTE_WRITE, TOPIC_CONNECTIVITY_EVENT,
    TOPIC_CONTROLLER_STATE, TOPIC_IDENTIFY,
};

use crate::{
    actuator::{ActuatorGateway, HvacLink, SimulatedLink},
    cn105::TcpBridgeLink,
    display::{DisplayDiagnostics, DisplayPresenter, TraceSurface},
    event_loop::{spawn_event_loop, AttributeWrite, CoreHandle, IdentifyRequest},
    indicator::LoggedIndicator,
};

#[derive(Clone)]
struct AppState {
    core: CoreHandle,
    store: DeviceStateStore,
    gateway: ActuatorGateway,
    display: DisplayPresenter,
    indicator: LoggedIndicator,
    mqtt: AsyncClient,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusView {
    #[serde(flatten)]
    snapshot: DeviceSnapshot,
    #[serde(rename = "pairedLed")]
    paired_led: bool,
    #[serde(rename = "uptimeMs")]
    uptime_ms: u64,
}

#[derive(Debug, Serialize)]
struct DisplayView {
    snapshot: DisplaySnapshot,
    diagnostics: DisplayDiagnostics,
    frame: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EventResponse {
    applied: bool,
    transition: Option<ConnectivityTransition>,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const CORE_EVENT_QUEUE_DEPTH: usize = 32;
const ACTUATION_OUTCOME_QUEUE_DEPTH: usize = 8;
const SIMULATED_LINK_LATENCY_MS: u64 = 20;

pub async fn run() -> anyhow::Result<()> {
    start_clock();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_store = AppStore::new();
    let mut runtime = config_store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime);
    runtime.sanitize();

    let hw = &runtime.hardware;
    info!(
        "hardware: display i2c {:#04x} (sda {}, scl {}), hvac uart{} tx {} rx {} at {} baud, paired led gpio {}",
        hw.display_i2c_addr,
        hw.i2c_sda_pin,
        hw.i2c_scl_pin,
        hw.hvac_uart_port,
        hw.hvac_uart_tx_pin,
        hw.hvac_uart_rx_pin,
        hw.hvac_baud_rate,
        hw.paired_led_pin
    );

    let store = DeviceStateStore::new(ThermostatLimits::default());
    let (display, _flush_task) = DisplayPresenter::spawn(TraceSurface, runtime.display.clone());
    display.render(&store.display_snapshot());

    let link: Box<dyn HvacLink> = match runtime.actuator.link_addr.clone() {
        Some(addr) => {
            info!("hvac link via serial bridge at {addr}");
            // Late replies are written off within one ack window.
            let settle = Duration::from_millis(runtime.actuator.ack_timeout_ms / 2);
            Box::new(TcpBridgeLink::new(addr, settle))
        }
        None => {
            info!("no hvac bridge configured, using simulated link");
            Box::new(SimulatedLink::new(Duration::from_millis(
                SIMULATED_LINK_LATENCY_MS,
            )))
        }
    };
    let (outcome_tx, outcome_rx) = mpsc::channel(ACTUATION_OUTCOME_QUEUE_DEPTH);
    let (gateway, _actuator_task) =
        ActuatorGateway::spawn(link, runtime.actuator.clone(), outcome_tx);

    let indicator = LoggedIndicator::new(runtime.hardware.paired_led_pin);
    let dispatcher = AttributeDispatcher::new(
        runtime.endpoint_id,
        store.clone(),
        gateway.clone(),
        display.clone(),
    );
    let reducer = ConnectivityReducer::new(store.clone(), display.clone(), indicator.clone());
    let (core, _core_task) =
        spawn_event_loop(dispatcher, reducer, outcome_rx, CORE_EVENT_QUEUE_DEPTH);

    let network = &runtime.network;
    let mut mqtt_options =
        MqttOptions::new("thermostat-controller", network.mqtt_host.clone(), network.mqtt_port);
    if !network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        core,
        store,
        gateway,
        display,
        indicator,
        mqtt,
    };

    subscribe_topics(&app_state.mqtt)
        .await
        .context("failed to subscribe controller topics")?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_state_publish_loop(
        app_state.clone(),
        Duration::from_millis(runtime.state_publish_interval_ms),
    );

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/actuator", get(handle_get_actuator))
        .route("/api/display", get(handle_get_display))
        .route("/api/attribute", post(handle_post_attribute))
        .route("/api/event", post(handle_post_event))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = env_parse::<u16>("MQTT_PORT") {
        runtime.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Some(port) = env_parse::<u16>("CONTROLLER_HTTP_PORT") {
        runtime.http_port = port;
    }
    if let Ok(addr) = std::env::var("HVAC_LINK_ADDR") {
        runtime.actuator.link_addr = Some(addr).filter(|addr| !addr.is_empty());
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down controller");
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [TOPIC_ATTRIBUTE_WRITE, TOPIC_CONNECTIVITY_EVENT, TOPIC_IDENTIFY];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, &message.payload).await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            publish_json(
                &app_state.mqtt,
                TOPIC_CONTROLLER_STATE,
                &status_view(&app_state),
            )
            .await;
            publish_json(
                &app_state.mqtt,
                TOPIC_ACTUATOR_STATE,
                &app_state.gateway.diagnostics(),
            )
            .await;
        }
    });
}

async fn publish_json<T: Serialize>(mqtt: &AsyncClient, topic: &str, value: &T) {
    match serde_json::to_vec(value) {
        Ok(body) => {
            if let Err(err) = mqtt.publish(topic, QoS::AtLeastOnce, true, body).await {
                warn!("{topic} publish failed: {err}");
            }
        }
        Err(err) => warn!("{topic} serialization failed: {err}"),
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    match topic {
        TOPIC_ATTRIBUTE_WRITE => {
            let write: AttributeWrite =
                serde_json::from_slice(payload).context("invalid attribute write payload")?;
            if let DispatchOutcome::Rejected(err) = app_state.core.write_attribute(write).await? {
                info!("attribute write {:#06x} vetoed: {err}", write.attribute);
            }
        }
        TOPIC_CONNECTIVITY_EVENT => {
            let event: ConnectivityEvent =
                serde_json::from_slice(payload).context("invalid connectivity event payload")?;
            app_state.core.connectivity(event).await?;
        }
        TOPIC_IDENTIFY => {
            let request: IdentifyRequest =
                serde_json::from_slice(payload).context("invalid identify payload")?;
            app_state.core.identify(request).await?;
        }
        _ => debug!("ignoring mqtt topic {topic}"),
    }
    Ok(())
}

fn status_view(state: &AppState) -> StatusView {
    StatusView {
        snapshot: state.store.snapshot(),
        paired_led: state.indicator.is_on(),
        uptime_ms: monotonic_ms(),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(status_view(&state))
}

async fn handle_get_actuator(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.diagnostics())
}

async fn handle_get_display(State(state): State<AppState>) -> impl IntoResponse {
    Json(DisplayView {
        snapshot: state.store.display_snapshot(),
        diagnostics: state.display.diagnostics(),
        frame: state.display.current_frame().to_ascii(),
    })
}

async fn handle_post_attribute(
    State(state): State<AppState>,
    Json(write): Json<AttributeWrite>,
) -> impl IntoResponse {
    match state.core.write_attribute(write).await {
        Ok(DispatchOutcome::Rejected(err)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string())
        }
        Ok(DispatchOutcome::Ignored) => {
            error_response(StatusCode::NOT_FOUND, "Attribute not handled by thermostat")
        }
        Ok(_) => handle_get_status(State(state)).await.into_response(),
        Err(err) => {
            warn!("attribute write failed: {err:#}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Event loop unavailable")
        }
    }
}

async fn handle_post_event(
    State(state): State<AppState>,
    Json(event): Json<ConnectivityEvent>,
) -> impl IntoResponse {
    match state.core.connectivity(event).await {
        Ok(transition) => Json(EventResponse {
            applied: transition.is_some(),
            transition,
        })
        .into_response(),
        Err(err) => {
            warn!("connectivity event failed: {err:#}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Event loop unavailable")
        }
    }
}

impl AppStore {
    fn new() -> Self {
        let path = std::env::var("THERMOSTAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/runtime.json"));
        Self::at(path)
    }

    fn at(path: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(path),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).with_context(|| {
                format!("invalid runtime config {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Uptime origin. Set at the top of `run()`.
fn start_clock() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

fn monotonic_ms() -> u64 {
    start_clock()
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
