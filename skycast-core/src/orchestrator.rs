//! Sequencing of search / geolocation / settings-change events.
//!
//! One logical sequence at a time is "current": starting a new one bumps a
//! generation counter, and every state mutation or sink emission first checks
//! that its token still matches. Superseded sequences are not aborted; their
//! late results are silently dropped. (Cooperative cancellation: the
//! underlying network calls run to completion but never apply.)

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::advisory::{AdvisoryStore, Conditions};
use crate::error::LocationError;
use crate::gateway::GatewayClient;
use crate::location::{Geolocator, resolve_user_location};
use crate::model::{GeoResult, WeatherBundle};
use crate::settings::{Settings, SettingsStore, TimeFormat, Units};

/// Quiet period a keystroke burst must survive before a search fires.
pub const SEARCH_DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Shortest trimmed input that can trigger a debounced search.
pub const MIN_SEARCH_LENGTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Failed,
}

/// Marker for one logical search sequence. A token is current until the next
/// sequence begins; stale tokens must not mutate shared state.
#[derive(Debug, Clone)]
pub struct SearchToken {
    id: u64,
    generation: Arc<AtomicU64>,
}

impl SearchToken {
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.id
    }
}

/// Renderer/notifier collaborator. Emissions arrive in sequence order except
/// `advisories_resolved`, which completes asynchronously and may trail the
/// weather signal.
pub trait EventSink: Send + Sync {
    fn loading(&self, city: &str);
    fn city_resolved(&self, place: &GeoResult);
    fn weather_resolved(&self, bundle: &WeatherBundle, settings: &Settings);
    fn advisories_resolved(&self, tips: &[String]);
    fn error(&self, message: &str);
}

struct State {
    settings: Settings,
    phase: Phase,
    bundle: Option<WeatherBundle>,
}

struct Inner {
    gateway: GatewayClient,
    advisories: AdvisoryStore,
    sink: Arc<dyn EventSink>,
    store: SettingsStore,
    geolocator: Option<Box<dyn Geolocator>>,
    state: Mutex<State>,
    generation: Arc<AtomicU64>,
    debounce_seq: AtomicU64,
    debounce_delay_ms: AtomicU64,
    advisory_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct SearchOrchestrator {
    inner: Arc<Inner>,
}

impl SearchOrchestrator {
    pub fn new(
        gateway: GatewayClient,
        advisories: AdvisoryStore,
        store: SettingsStore,
        sink: Arc<dyn EventSink>,
        geolocator: Option<Box<dyn Geolocator>>,
    ) -> Self {
        let settings = store.load();
        Self {
            inner: Arc::new(Inner {
                gateway,
                advisories,
                sink,
                store,
                geolocator,
                state: Mutex::new(State {
                    settings,
                    phase: Phase::Idle,
                    bundle: None,
                }),
                generation: Arc::new(AtomicU64::new(0)),
                debounce_seq: AtomicU64::new(0),
                debounce_delay_ms: AtomicU64::new(SEARCH_DEBOUNCE_DELAY.as_millis() as u64),
                advisory_task: Mutex::new(None),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub fn settings(&self) -> Settings {
        self.inner.state.lock().settings.clone()
    }

    /// Tests shorten the quiet period.
    pub fn set_debounce_delay(&self, delay: Duration) {
        self.inner
            .debounce_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Explicit search submit. Supersedes any in-flight sequence.
    pub async fn search(&self, city: &str) {
        let city = city.trim();
        if city.is_empty() {
            self.inner.sink.error("enter a city name to search");
            return;
        }
        let token = self.inner.begin();
        Inner::run_search(Arc::clone(&self.inner), token, city.to_string()).await;
    }

    /// Debounced input. Every call resets the pending timer; only input of
    /// at least [`MIN_SEARCH_LENGTH`] characters arms a new one, and only
    /// the timer that survives the quiet period fires.
    pub fn input_changed(&self, text: &str) {
        let trimmed = text.trim().to_string();
        let seq = self.inner.debounce_seq.fetch_add(1, Ordering::SeqCst) + 1;
        if trimmed.chars().count() < MIN_SEARCH_LENGTH {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let delay = Duration::from_millis(inner.debounce_delay_ms.load(Ordering::SeqCst));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.debounce_seq.load(Ordering::SeqCst) != seq {
                // a newer keystroke reset the timer
                return;
            }
            let token = inner.begin();
            Inner::run_search(inner, token, trimmed).await;
        });
    }

    /// Geolocation flow: resolve a position, then run the weather pipeline
    /// from the resolved coordinates.
    pub async fn locate(&self) {
        let token = self.inner.begin();
        Inner::run_locate(Arc::clone(&self.inner), token).await;
    }

    /// Startup flow: prewarm the advisory table in the background, try
    /// geolocation, and fall back to the persisted city.
    pub async fn initialize(&self) {
        let warm = Arc::clone(&self.inner);
        tokio::spawn(async move {
            warm.advisories.prewarm().await;
        });

        match resolve_user_location(self.inner.geolocator.as_deref(), &self.inner.gateway).await {
            Ok(place) => {
                tracing::info!(city = %place.name, "starting with geolocated position");
                let token = self.inner.begin();
                self.inner.set_phase(Phase::Loading);
                self.inner.sink.loading(&place.name);
                Inner::continue_with_place(Arc::clone(&self.inner), token, place).await;
            }
            Err(e) => {
                if !matches!(e, LocationError::Unsupported) {
                    tracing::warn!("startup geolocation failed: {e}");
                }
                let city = self.inner.state.lock().settings.current_city.clone();
                tracing::info!(%city, "starting with persisted city");
                let token = self.inner.begin();
                Inner::run_search(Arc::clone(&self.inner), token, city).await;
            }
        }
    }

    /// Unit-system change: persist, then re-run the whole sequence.
    pub async fn set_units(&self, units: Units) {
        let city = {
            let mut state = self.inner.state.lock();
            if state.settings.units == units {
                return;
            }
            state.settings.units = units;
            self.inner.store.save(&state.settings);
            state.settings.current_city.clone()
        };
        tracing::info!(%units, "unit system changed, re-running search");
        let token = self.inner.begin();
        Inner::run_search(Arc::clone(&self.inner), token, city).await;
    }

    /// Clock-format change: presentation only, so re-emit the bundle we
    /// already have; fall back to a full re-run when there is none.
    pub async fn set_time_format(&self, format: TimeFormat) {
        let (bundle, settings) = {
            let mut state = self.inner.state.lock();
            if state.settings.time_format == format {
                return;
            }
            state.settings.time_format = format;
            self.inner.store.save(&state.settings);
            (state.bundle.clone(), state.settings.clone())
        };
        match bundle {
            Some(bundle) => self.inner.sink.weather_resolved(&bundle, &settings),
            None => {
                let token = self.inner.begin();
                Inner::run_search(Arc::clone(&self.inner), token, settings.current_city).await;
            }
        }
    }

    /// Wait for a trailing advisory emission to settle. The CLI calls this
    /// before exiting so background derivation is not cut off.
    pub async fn idle(&self) {
        let task = self.inner.advisory_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Inner {
    fn begin(&self) -> SearchToken {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        SearchToken {
            id,
            generation: Arc::clone(&self.generation),
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.state.lock().phase = phase;
    }

    /// Fail the sequence: set the phase and notify, unless superseded.
    fn fail(&self, token: &SearchToken, message: &str) {
        if !token.is_current() {
            tracing::debug!("superseded sequence failed quietly: {message}");
            return;
        }
        tracing::warn!("search sequence failed: {message}");
        self.set_phase(Phase::Failed);
        self.sink.error(message);
    }

    async fn run_search(inner: Arc<Inner>, token: SearchToken, city: String) {
        inner.set_phase(Phase::Loading);
        inner.sink.loading(&city);
        tracing::info!(%city, "search sequence started");

        let place = match inner.gateway.geocode(&city).await {
            Ok(place) => place,
            Err(e) => {
                inner.fail(&token, &e.to_string());
                return;
            }
        };
        Self::continue_with_place(inner, token, place).await;
    }

    async fn run_locate(inner: Arc<Inner>, token: SearchToken) {
        inner.set_phase(Phase::Loading);
        inner.sink.loading("current location");

        let place =
            match resolve_user_location(inner.geolocator.as_deref(), &inner.gateway).await {
                Ok(place) => place,
                Err(e) => {
                    inner.fail(&token, &e.to_string());
                    return;
                }
            };
        Self::continue_with_place(inner, token, place).await;
    }

    /// The shared tail of every sequence: persist the place, fetch weather,
    /// persist the update stamp, then derive advisories in the background.
    async fn continue_with_place(inner: Arc<Inner>, token: SearchToken, place: GeoResult) {
        if !token.is_current() {
            tracing::debug!(city = %place.name, "superseded before the city could be applied");
            return;
        }
        let units = {
            let mut state = inner.state.lock();
            state.settings.current_city = place.name.clone();
            state.settings.current_lat = Some(place.lat);
            state.settings.current_lon = Some(place.lon);
            inner.store.save(&state.settings);
            state.settings.units
        };
        inner.sink.city_resolved(&place);

        let bundle = match inner.gateway.fetch_weather(place.lat, place.lon, units).await {
            Ok(bundle) => bundle,
            Err(e) => {
                inner.fail(&token, &e.to_string());
                return;
            }
        };
        if !token.is_current() {
            tracing::debug!(city = %place.name, "superseded before weather could be applied");
            return;
        }

        let settings = {
            let mut state = inner.state.lock();
            state.settings.last_update_timestamp = Some(Utc::now().timestamp_millis());
            state.bundle = Some(bundle.clone());
            state.phase = Phase::Success;
            inner.store.save(&state.settings);
            state.settings.clone()
        };
        inner.sink.weather_resolved(&bundle, &settings);

        // Advisory derivation may outlive later sequences; it applies only
        // while its token is still current.
        let conditions = Conditions::from(&bundle.current);
        let advisory_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let tips = advisory_inner.advisories.advisories(conditions).await;
            if token.is_current() {
                advisory_inner.sink.advisories_resolved(&tips);
            } else {
                tracing::debug!("superseded before advisories could be applied");
            }
        });
        *inner.advisory_task.lock() = Some(task);
    }
}
