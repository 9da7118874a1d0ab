// =============================================================================
// Metric Kernel — pure (ticker, snapshot) -> value functions
// =============================================================================
//
// Five deterministic, independently cancellable functions. Each sleeps for a
// uniformly random duration in the configured delay range before returning,
// simulating the cost of a real analytical computation. The sleep is raced
// against a `CancellationToken` so the Analysis Engine can abort an
// in-flight kernel promptly without it ever writing a partial result.
//
// The actual analytical meaning of each metric is simulated — only the
// shape (bounded range, dependence on the snapshot and ticker) matters per
// the specification this crate implements.
// =============================================================================

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio_util::sync::CancellationToken;

use crate::portfolio::document::{Metric, Snapshot};

/// Outcome of one kernel invocation.
pub enum KernelOutcome {
    Completed(f64),
    Cancelled,
}

/// Derive a per-(run, metric) seed from the run's shared seed so that each
/// metric still produces a value that is a pure function of
/// `(snapshot, ticker, rng_seed)` as required, while not all five metrics of
/// one run draw from an identical stream.
fn derive_seed(run_seed: u64, metric: Metric) -> u64 {
    let tag = match metric {
        Metric::PortfolioRisk => 1,
        Metric::Concentration => 2,
        Metric::Correlation => 3,
        Metric::Momentum => 4,
        Metric::AllocationScore => 5,
    };
    run_seed.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(tag)
}

/// Compute one metric for `ticker` against `snapshot`, sleeping for a
/// cancellable artificial delay first.
pub async fn compute(
    metric: Metric,
    ticker: &str,
    snapshot: &Snapshot,
    run_seed: u64,
    delay_range: (f64, f64),
    cancel: &CancellationToken,
) -> KernelOutcome {
    let seed = derive_seed(run_seed, metric);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let (min, max) = delay_range;
    let delay_secs = if max > min {
        rng.gen_range(min..max)
    } else {
        min
    };

    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs_f64(delay_secs)) => {
            let value = value_for(metric, ticker, snapshot, seed);
            KernelOutcome::Completed(value)
        }
        _ = cancel.cancelled() => KernelOutcome::Cancelled,
    }
}

fn value_for(metric: Metric, ticker: &str, snapshot: &Snapshot, seed: u64) -> f64 {
    match metric {
        Metric::PortfolioRisk => portfolio_risk(ticker, snapshot),
        Metric::Concentration => concentration(ticker, snapshot),
        Metric::Correlation => correlation(ticker, snapshot, seed),
        Metric::Momentum => momentum(ticker, seed),
        Metric::AllocationScore => allocation_score(ticker, snapshot, seed),
    }
}

fn shares_for(ticker: &str, snapshot: &Snapshot) -> i64 {
    snapshot.holdings.get(ticker).copied().unwrap_or(0)
}

/// Bounded real derived from total_value and the ticker's share count.
/// Larger positions in a larger book read as marginally riskier; clamped
/// to a sane [0, 1] band.
fn portfolio_risk(ticker: &str, snapshot: &Snapshot) -> f64 {
    let shares = shares_for(ticker, snapshot) as f64;
    if snapshot.total_value <= 0.0 {
        return 0.0;
    }
    let exposure = (shares * 100.0) / snapshot.total_value.max(1.0);
    exposure.clamp(0.0, 1.0)
}

/// `holdings[ticker] * price[ticker] / total_value`, clamped to [0, 1].
/// Since the actual current price is not carried on the snapshot, the
/// notional value of the position is approximated from its proportional
/// share of `total_value` relative to total shares held across the book.
fn concentration(ticker: &str, snapshot: &Snapshot) -> f64 {
    let shares = shares_for(ticker, snapshot) as f64;
    let total_shares: f64 = snapshot.holdings.values().map(|s| *s as f64).sum();

    if snapshot.total_value <= 0.0 || total_shares <= 0.0 {
        return 0.0;
    }

    let notional = (shares / total_shares) * snapshot.total_value;
    (notional / snapshot.total_value).clamp(0.0, 1.0)
}

/// Real in [-1, 1] derived from the ticker and the rest of the book.
fn correlation(ticker: &str, snapshot: &Snapshot, seed: u64) -> f64 {
    let other_tickers = snapshot.holdings.len().saturating_sub(1) as f64;
    let base = jitter(seed, ticker) * 2.0 - 1.0;
    let damp = 1.0 / (1.0 + other_tickers * 0.1);
    (base * damp).clamp(-1.0, 1.0)
}

/// Real in [-1, 1] derived from the ticker alone.
fn momentum(ticker: &str, seed: u64) -> f64 {
    (jitter(seed, ticker) * 2.0 - 1.0).clamp(-1.0, 1.0)
}

/// Real in [-1, 1] indicating over/under-allocation relative to an equal
/// split across the book.
fn allocation_score(ticker: &str, snapshot: &Snapshot, seed: u64) -> f64 {
    let n = snapshot.holdings.len().max(1) as f64;
    let shares = shares_for(ticker, snapshot) as f64;
    let total_shares: f64 = snapshot.holdings.values().map(|s| *s as f64).sum();

    let actual_share = if total_shares > 0.0 {
        shares / total_shares
    } else {
        0.0
    };
    let equal_share = 1.0 / n;
    let deviation = (actual_share - equal_share) * n;
    (deviation + (jitter(seed, ticker) - 0.5) * 0.1).clamp(-1.0, 1.0)
}

/// Deterministic pseudo-random value in `[0, 1)` derived from `seed` and
/// `ticker`, used to give each metric some ticker-dependent spread beyond
/// the pure numeric seed.
fn jitter(seed: u64, ticker: &str) -> f64 {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ fnv1a(ticker));
    rng.gen::<f64>()
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::document::PortfolioDocument;
    use std::collections::HashMap;

    fn snapshot_with(holdings: &[(&str, i64)], total_value: f64) -> Snapshot {
        let mut doc = PortfolioDocument::new("s-test", "2026-01-01T00:00:00Z");
        doc.holdings = holdings
            .iter()
            .map(|(t, s)| (t.to_string(), *s))
            .collect::<HashMap<_, _>>();
        doc.total_value = total_value;
        doc
    }

    #[test]
    fn same_inputs_yield_same_value() {
        let snap = snapshot_with(&[("AAPL", 100)], 125_000.0);
        let a = value_for(Metric::Momentum, "AAPL", &snap, derive_seed(7, Metric::Momentum));
        let b = value_for(Metric::Momentum, "AAPL", &snap, derive_seed(7, Metric::Momentum));
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_can_differ() {
        let snap = snapshot_with(&[("AAPL", 100)], 125_000.0);
        let a = value_for(Metric::Momentum, "AAPL", &snap, derive_seed(1, Metric::Momentum));
        let b = value_for(Metric::Momentum, "AAPL", &snap, derive_seed(2, Metric::Momentum));
        assert_ne!(a, b);
    }

    #[test]
    fn concentration_is_clamped_to_unit_interval() {
        let snap = snapshot_with(&[("AAPL", 100), ("GOOGL", 50)], 125_000.0);
        for seed in 0..20 {
            let v = value_for(Metric::Concentration, "AAPL", &snap, seed);
            assert!((0.0..=1.0).contains(&v), "concentration out of range: {v}");
        }
    }

    #[test]
    fn correlation_momentum_allocation_are_bounded() {
        let snap = snapshot_with(&[("AAPL", 100), ("GOOGL", 50), ("MSFT", 75)], 125_000.0);
        for seed in 0..20 {
            let c = value_for(Metric::Correlation, "AAPL", &snap, seed);
            let m = value_for(Metric::Momentum, "AAPL", &snap, seed);
            let a = value_for(Metric::AllocationScore, "AAPL", &snap, seed);
            assert!((-1.0..=1.0).contains(&c));
            assert!((-1.0..=1.0).contains(&m));
            assert!((-1.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn empty_holdings_do_not_panic() {
        let snap = snapshot_with(&[], 0.0);
        for metric in Metric::ALL {
            let v = value_for(metric, "AAPL", &snap, 42);
            assert!(v.is_finite());
        }
    }

    #[test]
    fn absent_ticker_still_produces_a_value() {
        let snap = snapshot_with(&[("GOOGL", 50)], 50_000.0);
        for metric in Metric::ALL {
            let v = value_for(metric, "ZZZZ", &snap, 42);
            assert!(v.is_finite());
        }
    }

    #[tokio::test]
    async fn compute_honors_cancellation_before_delay_elapses() {
        let cancel = CancellationToken::new();
        let snap = snapshot_with(&[("AAPL", 100)], 125_000.0);

        cancel.cancel();
        let outcome = compute(
            Metric::Momentum,
            "AAPL",
            &snap,
            1,
            (2.0, 5.0),
            &cancel,
        )
        .await;

        assert!(matches!(outcome, KernelOutcome::Cancelled));
    }

    #[tokio::test]
    async fn compute_completes_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let snap = snapshot_with(&[("AAPL", 100)], 125_000.0);

        let outcome = compute(
            Metric::Momentum,
            "AAPL",
            &snap,
            1,
            (0.0, 0.001),
            &cancel,
        )
        .await;

        assert!(matches!(outcome, KernelOutcome::Completed(_)));
    }
}
