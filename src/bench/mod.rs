//! Warm-up-then-time throughput driver.

pub mod suite;

use std::{
    fmt,
    time::{Duration, Instant},
};

use tracing::{debug, info};

pub const DEFAULT_ITERATIONS: usize = 1000;

/// Runs once after the timed loop, before the clock stops.
pub type DoneHook<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub iterations: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchSample {
    pub name: String,
    pub iterations: usize,
    pub elapsed: Duration,
}

impl BenchSample {
    pub fn its_per_sec(&self) -> f64 {
        self.iterations as f64 / self.elapsed.as_secs_f64()
    }
}

impl fmt::Display for BenchSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2} its/sec", self.name, self.its_per_sec())
    }
}

/// Calls `fxn` once untimed, then `its` times on a monotonic clock, then
/// `done`. Returns iterations per second.
pub fn timeit<F>(fxn: F, its: usize, done: Option<DoneHook<'_>>) -> anyhow::Result<f64>
where
    F: FnMut() -> anyhow::Result<()>,
{
    Ok(timeit_sample("timeit", fxn, its, done)?.its_per_sec())
}

pub fn timeit_sample<F>(
    name: &str,
    mut fxn: F,
    its: usize,
    done: Option<DoneHook<'_>>,
) -> anyhow::Result<BenchSample>
where
    F: FnMut() -> anyhow::Result<()>,
{
    anyhow::ensure!(its > 0, "{name}: need at least one iteration");

    fxn()?;

    let report_every = (its / 10).max(1);
    let st = Instant::now();
    for i in 1..=its {
        fxn()?;
        if i % report_every == 0 {
            debug!(name, done = i, total = its, "progress");
        }
    }
    if let Some(done) = done {
        done()?;
    }
    // a zero reading would make the rate infinite
    let elapsed = st.elapsed().max(Duration::from_nanos(1));

    let sample = BenchSample {
        name: name.to_owned(),
        iterations: its,
        elapsed,
    };
    info!(
        name,
        iterations = its,
        elapsed_ms = elapsed.as_secs_f64() * 1e3,
        its_per_sec = sample.its_per_sec(),
        "benchmark finished"
    );
    Ok(sample)
}

/// Builder over [`timeit_sample`].
pub struct Bench<'a> {
    name: String,
    iterations: usize,
    done: Option<DoneHook<'a>>,
}

impl<'a> Bench<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, &BenchConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: &BenchConfig) -> Self {
        Self {
            name: name.into(),
            iterations: config.iterations,
            done: None,
        }
    }

    pub fn iterations(mut self, its: usize) -> Self {
        self.iterations = its;
        self
    }

    pub fn done(mut self, done: impl FnOnce() -> anyhow::Result<()> + 'a) -> Self {
        self.done = Some(Box::new(done));
        self
    }

    pub fn run(self, fxn: impl FnMut() -> anyhow::Result<()>) -> anyhow::Result<BenchSample> {
        timeit_sample(&self.name, fxn, self.iterations, self.done)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, thread::sleep};

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Event {
        Action,
        Done,
    }

    #[test]
    fn test_action_count_and_hook_order() -> anyhow::Result<()> {
        for its in [1, 7, 1000] {
            let events = RefCell::new(Vec::new());
            let rate = timeit(
                || {
                    events.borrow_mut().push(Event::Action);
                    Ok(())
                },
                its,
                Some(Box::new(|| -> anyhow::Result<()> {
                    events.borrow_mut().push(Event::Done);
                    Ok(())
                })),
            )?;

            let events = events.into_inner();
            assert_eq!(events.len(), its + 2);
            assert!(events[..its + 1].iter().all(|e| *e == Event::Action));
            assert_eq!(events.last(), Some(&Event::Done));
            assert!(rate.is_finite() && rate > 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_without_hook() -> anyhow::Result<()> {
        let mut calls = 0;
        let rate = timeit(
            || {
                calls += 1;
                Ok(())
            },
            DEFAULT_ITERATIONS,
            None,
        )?;
        assert_eq!(calls, DEFAULT_ITERATIONS + 1);
        assert!(rate.is_finite() && rate > 0.0);
        Ok(())
    }

    #[test]
    fn test_rate_is_iterations_over_elapsed() -> anyhow::Result<()> {
        let sample = timeit_sample("noop", || Ok(()), 500, None)?;
        assert_eq!(sample.iterations, 500);
        assert!(sample.elapsed > Duration::ZERO);
        let expected = 500.0 / sample.elapsed.as_secs_f64();
        assert!((sample.its_per_sec() - expected).abs() <= expected * 1e-12);
        Ok(())
    }

    #[test]
    fn test_warmup_is_not_timed() -> anyhow::Result<()> {
        let warmup = Duration::from_millis(300);
        let mut first = true;
        let sample = timeit_sample(
            "slow warmup",
            || {
                if first {
                    first = false;
                    sleep(warmup);
                }
                Ok(())
            },
            10,
            None,
        )?;
        assert!(sample.elapsed < warmup);
        Ok(())
    }

    #[test]
    fn test_hook_is_timed() -> anyhow::Result<()> {
        let hook = Duration::from_millis(50);
        let sample = Bench::new("slow hook")
            .iterations(3)
            .done(|| {
                sleep(hook);
                Ok(())
            })
            .run(|| Ok(()))?;
        assert!(sample.elapsed >= hook);
        Ok(())
    }

    #[test]
    fn test_action_error_propagates() {
        let mut calls = 0;
        let hook_ran = RefCell::new(false);
        let result = timeit(
            || {
                calls += 1;
                anyhow::ensure!(calls < 3, "device lost");
                Ok(())
            },
            10,
            Some(Box::new(|| -> anyhow::Result<()> {
                *hook_ran.borrow_mut() = true;
                Ok(())
            })),
        );
        let err = result.expect_err("third call fails");
        assert!(err.to_string().contains("device lost"));
        assert_eq!(calls, 3);
        assert!(!*hook_ran.borrow());
    }

    #[test]
    fn test_hook_error_propagates() {
        let result = timeit(
            || Ok(()),
            5,
            Some(Box::new(|| -> anyhow::Result<()> {
                anyhow::bail!("sync failed")
            })),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut calls = 0;
        let result = timeit(
            || {
                calls += 1;
                Ok(())
            },
            0,
            None,
        );
        assert!(result.is_err());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_builder_defaults_and_display() -> anyhow::Result<()> {
        let mut calls = 0;
        let sample = Bench::new("unary op").run(|| {
            calls += 1;
            Ok(())
        })?;
        assert_eq!(calls, DEFAULT_ITERATIONS + 1);
        assert_eq!(sample.iterations, DEFAULT_ITERATIONS);

        let line = sample.to_string();
        assert!(line.starts_with("unary op "));
        assert!(line.ends_with(" its/sec"));
        let rate: f64 = line["unary op ".len()..line.len() - " its/sec".len()].parse()?;
        assert!(rate > 0.0);
        Ok(())
    }
}
