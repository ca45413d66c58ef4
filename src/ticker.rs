use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::engine::{Analyzer, TickOutcome};
use crate::error::Result;

/// Fixed-period analysis task on its own thread. Stops when
/// [`stop`](Self::stop) is called or the handle is dropped.
pub struct Ticker {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl Ticker {
    pub fn spawn(analyzer: Analyzer, period: Duration) -> Result<Self> {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);

        let handle = std::thread::Builder::new()
            .name("analyzer-tick".into())
            .spawn(move || {
                let ticks = tick(period);
                let mut published = 0u64;
                loop {
                    select! {
                        // Disconnect is the stop signal.
                        recv(cancel_rx) -> _ => break,
                        recv(ticks) -> _ => {
                            if analyzer.tick() == TickOutcome::Published {
                                published += 1;
                            }
                        }
                    }
                }
                published
            })?;

        log::debug!("Ticker started, period {:?}", period);

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    /// Cancels the task and waits for it. Returns how many snapshots it
    /// published.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        drop(self.cancel.take());
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(published)) => {
                log::debug!("Ticker stopped after {} snapshots", published);
                published
            }
            Some(Err(_)) => {
                log::error!("Analysis thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::engine::AudioSource;
    use crate::engine::AudioTap;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Source(Mutex<Option<AudioTap>>);

    impl AudioSource for Source {
        fn install_tap(&self, tap: AudioTap) {
            *self.0.lock() = Some(tap);
        }

        fn remove_tap(&self) {
            *self.0.lock() = None;
        }
    }

    #[test]
    fn test_ticker_publishes_until_stopped() {
        let config = AnalyzerConfig {
            fft_size: 1024,
            settle_delay_ms: 0,
            ..AnalyzerConfig::default()
        };
        let analyzer = Analyzer::new(config);
        let source = Arc::new(Source::default());
        analyzer.attach(source.clone());
        if let Some(tap) = source.0.lock().as_ref() {
            tap.push_planar(&vec![0.25; 1024], None);
        }

        let ticker = analyzer
            .spawn_ticker_with_period(Duration::from_millis(2))
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let published = ticker.stop();

        assert!(published > 0);
        let sequence = analyzer.snapshot().sequence;
        assert_eq!(sequence, published);

        // Nothing runs after stop.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(analyzer.snapshot().sequence, sequence);
    }

    #[test]
    fn test_detach_while_ticking() {
        let config = AnalyzerConfig {
            fft_size: 1024,
            settle_delay_ms: 0,
            ..AnalyzerConfig::default()
        };
        let analyzer = Analyzer::new(config);
        let source = Arc::new(Source::default());
        analyzer.attach(source.clone());

        let ticker = analyzer
            .spawn_ticker_with_period(Duration::from_millis(1))
            .unwrap();
        for _ in 0..20 {
            if let Some(tap) = source.0.lock().as_ref() {
                tap.push_planar(&vec![0.5; 512], None);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        analyzer.detach();
        std::thread::sleep(Duration::from_millis(10));
        drop(ticker);

        assert!(analyzer.snapshot().is_empty());
    }
}
