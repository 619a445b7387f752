//! Subscriber assembly and runtime filter reload.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

type FilterLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Changes the level filter of the installed logger.
#[derive(Clone)]
pub struct ReloadHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    current: Arc<ArcSwap<String>>,
}

impl ReloadHandle {
    /// Replace the filter with `directives`.
    pub fn reload(&self, directives: &str) -> LogResult<()> {
        let filter = parse_filter(directives)?;
        self.filter
            .reload(filter)
            .map_err(|error| LogError::Reload(error.to_string()))?;
        self.current.store(Arc::new(directives.to_string()));
        tracing::info!(filter = directives, "log filter reloaded");
        Ok(())
    }

    /// The directives in effect.
    pub fn current(&self) -> Arc<String> {
        self.current.load_full()
    }
}

impl fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadHandle")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

/// Returned by [`LoggerBuilder::build`]. Holds the reload handle when the
/// configuration asked for one.
#[derive(Debug)]
#[must_use = "the guard carries the reload handle"]
pub struct LoggerGuard {
    reload: Option<ReloadHandle>,
}

impl LoggerGuard {
    /// The filter reload handle, if the logger is reloadable.
    pub fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.reload.as_ref()
    }
}

/// Installs the global subscriber described by a [`Config`].
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Timestamp column that can be switched off.
#[derive(Debug, Clone, Copy)]
struct Timer {
    enabled: bool,
}

impl FormatTime for Timer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        if self.enabled {
            SystemTime.format_time(w)
        } else {
            Ok(())
        }
    }
}

/// Apply the display options shared by every format.
macro_rules! with_display {
    ($layer:expr, $display:expr) => {{
        let display = $display;
        $layer
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source)
            .with_timer(Timer {
                enabled: display.time,
            })
            .with_writer(std::io::stderr)
    }};
}

impl LoggerBuilder {
    /// Builder for `config`.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Install the subscriber.
    ///
    /// Fails on invalid directives, or when a global subscriber is already
    /// installed.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let Config {
            level,
            format,
            display,
            reloadable,
        } = self.config;
        let filter = parse_filter(&level)?;
        let (filter_layer, reload) = filter_layer(filter, &level, reloadable);
        let registry = Registry::default().with(filter_layer);

        let installed = match format {
            Format::Pretty => registry
                .with(with_display!(tracing_subscriber::fmt::layer().pretty(), &display))
                .try_init(),
            Format::Compact => registry
                .with(with_display!(tracing_subscriber::fmt::layer().compact(), &display))
                .try_init(),
            Format::Json => registry
                .with(with_display!(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .flatten_event(display.flatten),
                    &display
                ))
                .try_init(),
        };
        installed.map_err(|error| LogError::Init(error.to_string()))?;

        tracing::debug!(filter = %level, ?format, "logger installed");
        Ok(LoggerGuard { reload })
    }
}

fn parse_filter(directives: &str) -> LogResult<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|error| LogError::Filter {
        directives: directives.to_string(),
        message: error.to_string(),
    })
}

fn filter_layer(filter: EnvFilter, directives: &str, reloadable: bool) -> (FilterLayer, Option<ReloadHandle>) {
    if reloadable {
        let (layer, handle) = reload::Layer::new(filter);
        let handle = ReloadHandle {
            filter: handle,
            current: Arc::new(ArcSwap::from_pointee(directives.to_string())),
        };
        (Box::new(layer), Some(handle))
    } else {
        (Box::new(filter), None)
    }
}
