//! Property tests for two-tier bounded parallelism
//!
//! Accounts run at most `n_a` at a time, each with at most `n_k` keyword tasks
//! in flight, so no more than `n_a * n_k` keyword tasks ever overlap and no
//! single account ever has more than `n_k`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use autopost::runner::run_bounded;

#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn nested_bounds_hold(
        n_a in 1usize..4,
        n_k in 1usize..4,
        accounts in 1usize..6,
        keywords in 1usize..6,
    ) {
        let accounts_gauge = Arc::new(Gauge::default());
        let keywords_gauge = Arc::new(Gauge::default());
        let per_account_gauges: Vec<Arc<Gauge>> =
            (0..accounts).map(|_| Arc::new(Gauge::default())).collect();
        let completed = Arc::new(AtomicUsize::new(0));

        let results = runtime().block_on({
            let accounts_gauge = Arc::clone(&accounts_gauge);
            let keywords_gauge = Arc::clone(&keywords_gauge);
            let per_account_gauges = per_account_gauges.clone();
            let completed = Arc::clone(&completed);
            async move {
                let account_tasks = per_account_gauges.into_iter().map(|account_gauge| {
                    let accounts_gauge = Arc::clone(&accounts_gauge);
                    let keywords_gauge = Arc::clone(&keywords_gauge);
                    let completed = Arc::clone(&completed);
                    async move {
                        accounts_gauge.enter();
                        let keyword_tasks = (0..keywords).map(|_| {
                            let keywords_gauge = Arc::clone(&keywords_gauge);
                            let account_gauge = Arc::clone(&account_gauge);
                            let completed = Arc::clone(&completed);
                            async move {
                                keywords_gauge.enter();
                                account_gauge.enter();
                                tokio::time::sleep(Duration::from_millis(1)).await;
                                account_gauge.leave();
                                keywords_gauge.leave();
                                completed.fetch_add(1, Ordering::SeqCst);
                            }
                        });
                        let inner = run_bounded(keyword_tasks, n_k).await;
                        accounts_gauge.leave();
                        inner.into_iter().filter(|r| r.is_ok()).count()
                    }
                });
                run_bounded(account_tasks, n_a).await
            }
        });

        prop_assert!(accounts_gauge.peak() <= n_a);
        prop_assert!(keywords_gauge.peak() <= n_a * n_k);
        for (i, gauge) in per_account_gauges.iter().enumerate() {
            prop_assert!(gauge.peak() <= n_k, "account {} peaked at {}", i, gauge.peak());
            prop_assert!(gauge.peak() >= 1);
        }
        prop_assert_eq!(completed.load(Ordering::SeqCst), accounts * keywords);

        let per_account: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        prop_assert_eq!(per_account, vec![keywords; accounts]);
    }

    #[test]
    fn panicking_tasks_do_not_block_siblings(limit in 1usize..4, total in 1usize..10) {
        let results = runtime().block_on(async move {
            let tasks = (0..total).map(|i| async move {
                if i % 3 == 0 {
                    panic!("task {i} failed");
                }
                i
            });
            run_bounded(tasks, limit).await
        });

        prop_assert_eq!(results.len(), total);
        for (i, result) in results.iter().enumerate() {
            if i % 3 == 0 {
                prop_assert!(result.is_err());
            } else {
                prop_assert_eq!(result.as_ref().ok(), Some(&i));
            }
        }
    }
}
