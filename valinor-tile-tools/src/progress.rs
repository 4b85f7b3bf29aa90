use indicatif::{ProgressBar, ProgressStyle};
use std::sync::OnceLock;
use valinor_batch::{TileOperation, TileOperationError};
use valinor_graphtile::GraphId;

static PROGRESS_STYLE: OnceLock<ProgressStyle> = OnceLock::new();

/// Turns on progress bars for the rest of the process.
///
/// # Errors
///
/// Fails if the template is invalid.
pub fn enable() -> anyhow::Result<()> {
    _ = PROGRESS_STYLE.set(
        ProgressStyle::with_template("[{elapsed}] {bar:40.cyan/blue} {msg} {percent}% ETA {eta}")?
            .progress_chars("##-"),
    );
    Ok(())
}

/// A progress bar, if they are enabled.
pub fn bar(len: u64, message: String) -> Option<ProgressBar> {
    PROGRESS_STYLE.get().map(|style| {
        let bar = ProgressBar::new(len);
        bar.set_message(message);
        bar.set_style(style.clone());
        bar
    })
}

/// Ticks a progress bar after every tile, whether or not it succeeded.
///
/// Failures are also printed above the bar, since the log is often filtered.
pub struct WithProgress<'a, O> {
    inner: &'a O,
    bar: Option<ProgressBar>,
}

impl<'a, O> WithProgress<'a, O> {
    pub fn new(inner: &'a O, bar: Option<ProgressBar>) -> Self {
        Self { inner, bar }
    }
}

impl<P, O: TileOperation<P>> TileOperation<P> for WithProgress<'_, O> {
    type Output = O::Output;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn process(&self, provider: &P, graph_id: GraphId) -> Result<Self::Output, TileOperationError> {
        let result = self.inner.process(provider, graph_id);
        if let Some(bar) = &self.bar {
            if let Err(e) = &result {
                bar.println(format!("{graph_id} failed ({}): {e}", e.kind()));
            }
            bar.inc(1);
        }
        result
    }
}
