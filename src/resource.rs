//! Resource budgeting for trial execution
//!
//! Requests are clamped against machine capacity rather than rejected:
//! asking for more threads or GPUs than exist degrades to what is
//! available, with a warning on the GPU dimension. Zero GPUs is a valid
//! budget (CPU-only trials).

use tracing::warn;

/// Machine capacity used to bound per-trial resource requests
#[derive(Debug, Clone, Copy)]
pub struct ResourceBudgeter {
    available_workers: usize,
    available_gpus: usize,
}

/// A clamped per-trial resource allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBudget {
    /// Worker-thread count, `<=` available threads
    pub num_workers: usize,

    /// GPU indices `0..n`, disjoint by construction
    pub gpus: Vec<usize>,
}

impl ResourceBudgeter {
    /// Create a budgeter with explicit capacity (useful for tests)
    pub fn new(available_workers: usize, available_gpus: usize) -> Self {
        Self {
            available_workers,
            available_gpus,
        }
    }

    /// Probe the current machine
    ///
    /// GPU enumeration is delegated to the deployment environment via
    /// `DETSEARCH_NUM_GPUS`; absent that, trials run CPU-only.
    pub fn detect() -> Self {
        let available_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let available_gpus = std::env::var("DETSEARCH_NUM_GPUS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Self::new(available_workers, available_gpus)
    }

    /// Number of worker threads on this machine
    pub fn available_workers(&self) -> usize {
        self.available_workers
    }

    /// Number of GPUs on this machine
    pub fn available_gpus(&self) -> usize {
        self.available_gpus
    }

    /// Clamp a resource request to machine capacity
    ///
    /// Never fails; over-requests degrade silently on the thread dimension
    /// and with a warning on the GPU dimension. `requested_workers = None`
    /// takes everything available.
    pub fn clamp(&self, requested_workers: Option<usize>, requested_gpus: usize) -> ResourceBudget {
        let num_workers = requested_workers
            .unwrap_or(self.available_workers)
            .min(self.available_workers);

        let num_gpus = if requested_gpus > self.available_gpus {
            warn!(
                requested = requested_gpus,
                available = self.available_gpus,
                "requested more GPUs than available, reducing to {}",
                self.available_gpus
            );
            self.available_gpus
        } else {
            requested_gpus
        };

        ResourceBudget {
            num_workers,
            gpus: (0..num_gpus).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    /// Collects formatted log output so tests can assert on emitted events.
    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl CaptureWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_warnings(f: impl FnOnce()) -> String {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        writer.contents()
    }

    #[test]
    fn test_clamp_within_capacity() {
        let budgeter = ResourceBudgeter::new(8, 4);
        let budget = budgeter.clamp(Some(4), 2);
        assert_eq!(budget.num_workers, 4);
        assert_eq!(budget.gpus, vec![0, 1]);
    }

    #[test]
    fn test_clamp_over_request() {
        let budgeter = ResourceBudgeter::new(2, 2);
        let budget = budgeter.clamp(Some(16), 8);
        assert_eq!(budget.num_workers, 2);
        assert_eq!(budget.gpus, vec![0, 1]);
    }

    #[test]
    fn test_gpu_over_request_emits_warning() {
        let output = capture_warnings(|| {
            let budget = ResourceBudgeter::new(4, 2).clamp(Some(2), 8);
            assert_eq!(budget.gpus.len(), 2);
        });
        assert!(
            output.contains("requested more GPUs than available"),
            "expected a GPU clamp warning, got: {output}"
        );
    }

    #[test]
    fn test_in_budget_gpu_request_is_silent() {
        let output = capture_warnings(|| {
            ResourceBudgeter::new(4, 2).clamp(Some(2), 1);
        });
        assert!(output.is_empty(), "unexpected warning: {output}");
    }

    #[test]
    fn test_clamp_zero_resources() {
        let budgeter = ResourceBudgeter::new(0, 0);
        let budget = budgeter.clamp(Some(4), 4);
        assert_eq!(budget.num_workers, 0);
        assert!(budget.gpus.is_empty());
    }

    #[test]
    fn test_default_workers_take_all() {
        let budgeter = ResourceBudgeter::new(6, 0);
        let budget = budgeter.clamp(None, 0);
        assert_eq!(budget.num_workers, 6);
        assert!(budget.gpus.is_empty());
    }

    #[test]
    fn test_gpu_indices_contiguous_from_zero() {
        let budgeter = ResourceBudgeter::new(4, 3);
        let budget = budgeter.clamp(Some(1), 3);
        assert_eq!(budget.gpus, vec![0, 1, 2]);
    }
}
