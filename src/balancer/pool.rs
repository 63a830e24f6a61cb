//! Backend pool: partition membership and selection.

use super::backend::{Backend, Health};
use super::config::StrategyKind;
use super::error::{BalancerError, BalancerResult};
use super::strategy::HealthyPartition;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Outcome of one forwarded request, reported back against its ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The upstream answered inside the healthy status range.
    Ok,
    /// The attempt failed; the backend is demoted.
    Failure,
}

/// Binds one in-flight request to the backend chosen for it.
///
/// A ticket is consumed by value in [`BackendPool::report_outcome`], so an
/// outcome can only be reported once per selection.
#[derive(Debug)]
pub struct SelectionTicket {
    slot: usize,
    backend: Arc<Backend>,
}

impl SelectionTicket {
    /// The backend this ticket selected.
    #[must_use]
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

/// Partition state guarded by the pool lock.
#[derive(Debug)]
struct PoolState {
    healthy: HealthyPartition,
    unhealthy: Vec<usize>,
}

impl PoolState {
    /// Move a slot out of selection. Idempotent.
    fn demote(&mut self, slot: usize) {
        self.healthy.remove(slot);
        if !self.unhealthy.contains(&slot) {
            self.unhealthy.push(slot);
        }
    }
}

/// The shared collection of backends, split into a healthy partition the
/// selector draws from and an unhealthy set excluded from selection.
///
/// Backends live in an arena fixed at startup; the partitions hold indices
/// into it. All membership mutation happens under one mutex, held only for
/// the pointer shuffling itself, never across network I/O.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    state: Mutex<PoolState>,
}

impl BackendPool {
    /// Create a pool over the given backends, all initially healthy.
    #[must_use]
    pub fn new(backends: Vec<Backend>, strategy: StrategyKind) -> Self {
        let backends: Vec<Arc<Backend>> = backends.into_iter().map(Arc::new).collect();

        let mut healthy = HealthyPartition::new(strategy, Vec::new());
        for (slot, backend) in backends.iter().enumerate() {
            healthy.insert(slot, backend.response_time().as_millis() as u64);
        }

        info!(
            backends = backends.len(),
            strategy = ?strategy,
            "Backend pool created"
        );
        for backend in &backends {
            debug!(backend = %backend.address(), "Pool member");
        }

        Self {
            backends,
            state: Mutex::new(PoolState {
                healthy,
                unhealthy: Vec::new(),
            }),
        }
    }

    /// Choose the next backend per the active strategy.
    ///
    /// # Errors
    ///
    /// Fails with [`BalancerError::NoHealthyBackends`] when the healthy
    /// partition is empty. The pool is left unchanged in that case.
    pub fn acquire_selection(&self) -> BalancerResult<SelectionTicket> {
        let mut state = self.state.lock().expect("pool lock poisoned");
        let slot = state
            .healthy
            .select()
            .ok_or(BalancerError::NoHealthyBackends)?;

        Ok(SelectionTicket {
            slot,
            backend: Arc::clone(&self.backends[slot]),
        })
    }

    /// Report the outcome of the request a ticket was issued for.
    ///
    /// On `Ok`, least-response-time puts the slot back keyed by its fresh
    /// response time; round robin never took it out. On `Failure` the slot
    /// is demoted, which is a no-op if the monitor demoted it first.
    pub fn report_outcome(&self, ticket: SelectionTicket, outcome: Outcome) {
        let SelectionTicket { slot, backend } = ticket;
        let mut state = self.state.lock().expect("pool lock poisoned");

        match outcome {
            Outcome::Ok => {
                if state.healthy.pops_on_select()
                    && !state.healthy.contains(slot)
                    && !state.unhealthy.contains(&slot)
                {
                    let response_time_ms = backend.response_time().as_millis() as u64;
                    state.healthy.insert(slot, response_time_ms);
                }
            },
            Outcome::Failure => {
                debug!(backend = %backend.address(), "Demoting backend after failed request");
                state.demote(slot);
            },
        }
    }

    /// Move a backend to the partition matching the probed health.
    /// Idempotent; a slot held by an outstanding ticket is left alone.
    pub fn reclassify(&self, slot: usize, health: Health) {
        let mut state = self.state.lock().expect("pool lock poisoned");

        match health {
            Health::Healthy => {
                if let Some(position) = state.unhealthy.iter().position(|s| *s == slot) {
                    state.unhealthy.remove(position);
                    let response_time_ms =
                        self.backends[slot].response_time().as_millis() as u64;
                    state.healthy.insert(slot, response_time_ms);
                }
            },
            Health::Unhealthy => {
                if state.healthy.contains(slot) {
                    state.demote(slot);
                }
            },
        }
    }

    /// Snapshot the partition membership for a monitor cycle.
    #[must_use]
    pub fn partition_snapshot(&self) -> (Vec<usize>, Vec<usize>) {
        let state = self.state.lock().expect("pool lock poisoned");
        (state.healthy.slots(), state.unhealthy.clone())
    }

    /// Get a backend by slot.
    #[must_use]
    pub fn backend(&self, slot: usize) -> &Arc<Backend> {
        &self.backends[slot]
    }

    /// Number of configured backends.
    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Number of backends currently eligible for selection.
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.state
            .lock()
            .expect("pool lock poisoned")
            .healthy
            .len()
    }

    /// Whether no backend is currently eligible for selection.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state
            .lock()
            .expect("pool lock poisoned")
            .healthy
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pool(count: usize, strategy: StrategyKind) -> BackendPool {
        let backends = (0..count)
            .map(|i| {
                Backend::new(&format!("http://10.0.0.{}:8081", i + 1), Health::Healthy).unwrap()
            })
            .collect();
        BackendPool::new(backends, strategy)
    }

    fn assert_partitions_cover(pool: &BackendPool) {
        let (healthy, unhealthy) = pool.partition_snapshot();
        assert_eq!(healthy.len() + unhealthy.len(), pool.backend_count());
        for slot in &healthy {
            assert!(!unhealthy.contains(slot));
        }
    }

    #[test]
    fn test_round_robin_selection_order() {
        let pool = make_pool(3, StrategyKind::RoundRobin);

        let mut addresses = Vec::new();
        for _ in 0..4 {
            let ticket = pool.acquire_selection().unwrap();
            addresses.push(ticket.backend().address().to_string());
            pool.report_outcome(ticket, Outcome::Ok);
        }

        assert_eq!(addresses[0], "http://10.0.0.1:8081");
        assert_eq!(addresses[1], "http://10.0.0.2:8081");
        assert_eq!(addresses[2], "http://10.0.0.3:8081");
        assert_eq!(addresses[3], addresses[0]);
    }

    #[test]
    fn test_empty_pool_yields_error_without_blocking() {
        let pool = make_pool(0, StrategyKind::RoundRobin);
        assert!(matches!(
            pool.acquire_selection(),
            Err(BalancerError::NoHealthyBackends)
        ));
    }

    #[test]
    fn test_failure_demotes_backend() {
        let pool = make_pool(2, StrategyKind::RoundRobin);

        let ticket = pool.acquire_selection().unwrap();
        pool.report_outcome(ticket, Outcome::Failure);

        assert_eq!(pool.healthy_count(), 1);
        let (_, unhealthy) = pool.partition_snapshot();
        assert_eq!(unhealthy, vec![0]);
        assert_partitions_cover(&pool);

        // Selection keeps working on the survivor.
        let ticket = pool.acquire_selection().unwrap();
        assert_eq!(ticket.backend().address(), "http://10.0.0.2:8081");
        pool.report_outcome(ticket, Outcome::Ok);
    }

    #[test]
    fn test_all_demoted_yields_empty_pool() {
        let pool = make_pool(1, StrategyKind::RoundRobin);

        let ticket = pool.acquire_selection().unwrap();
        pool.report_outcome(ticket, Outcome::Failure);

        assert!(pool.is_exhausted());
        assert!(pool.acquire_selection().is_err());
    }

    #[test]
    fn test_least_response_time_pops_in_flight_slot() {
        let pool = make_pool(2, StrategyKind::LeastResponseTime);

        // Two overlapping selections must pick different backends.
        let first = pool.acquire_selection().unwrap();
        let second = pool.acquire_selection().unwrap();
        assert_ne!(first.backend().address(), second.backend().address());

        assert!(pool.is_exhausted());
        pool.report_outcome(first, Outcome::Ok);
        pool.report_outcome(second, Outcome::Ok);
        assert_eq!(pool.healthy_count(), 2);
    }

    #[test]
    fn test_least_response_time_failure_demotes() {
        let pool = make_pool(2, StrategyKind::LeastResponseTime);

        let ticket = pool.acquire_selection().unwrap();
        pool.report_outcome(ticket, Outcome::Failure);

        assert_eq!(pool.healthy_count(), 1);
        assert_partitions_cover(&pool);
    }

    #[test]
    fn test_reclassify_promotes_and_is_idempotent() {
        let pool = make_pool(2, StrategyKind::RoundRobin);
        pool.reclassify(0, Health::Unhealthy);
        assert_eq!(pool.healthy_count(), 1);

        // Same reclassification twice is identical to one call.
        pool.reclassify(0, Health::Unhealthy);
        assert_eq!(pool.healthy_count(), 1);
        assert_partitions_cover(&pool);

        pool.reclassify(0, Health::Healthy);
        assert_eq!(pool.healthy_count(), 2);
        pool.reclassify(0, Health::Healthy);
        assert_eq!(pool.healthy_count(), 2);
        assert_partitions_cover(&pool);
    }

    #[test]
    fn test_monitor_demotion_then_failure_report_is_idempotent() {
        let pool = make_pool(2, StrategyKind::RoundRobin);

        // Dispatcher selects, then the monitor demotes the same backend.
        let ticket = pool.acquire_selection().unwrap();
        pool.reclassify(0, Health::Unhealthy);
        assert_eq!(pool.healthy_count(), 1);

        // The late failure report must not double-add the slot.
        pool.report_outcome(ticket, Outcome::Failure);
        let (_, unhealthy) = pool.partition_snapshot();
        assert_eq!(unhealthy, vec![0]);
        assert_partitions_cover(&pool);
    }

    #[test]
    fn test_ok_report_does_not_resurrect_demoted_backend() {
        let pool = make_pool(2, StrategyKind::RoundRobin);

        // Round robin leaves the selected slot in the partition, so the
        // monitor can demote it while the request is in flight.
        let ticket = pool.acquire_selection().unwrap();
        pool.reclassify(0, Health::Unhealthy);
        assert_eq!(pool.healthy_count(), 1);

        pool.report_outcome(ticket, Outcome::Ok);
        // The monitor's demotion stands.
        assert_eq!(pool.healthy_count(), 1);
        let (_, unhealthy) = pool.partition_snapshot();
        assert_eq!(unhealthy, vec![0]);
        assert_partitions_cover(&pool);
    }

    #[test]
    fn test_reclassify_leaves_in_flight_slot_to_its_ticket() {
        let pool = make_pool(2, StrategyKind::LeastResponseTime);

        // The selection popped slot 0 out of both partitions.
        let ticket = pool.acquire_selection().unwrap();
        pool.reclassify(0, Health::Unhealthy);

        // Not moved: the ticket holder owns the slot.
        let (_, unhealthy) = pool.partition_snapshot();
        assert!(unhealthy.is_empty());

        pool.report_outcome(ticket, Outcome::Ok);
        assert_eq!(pool.healthy_count(), 2);
        assert_partitions_cover(&pool);
    }

    #[test]
    fn test_single_backend_round_robin() {
        let pool = make_pool(1, StrategyKind::RoundRobin);
        for _ in 0..3 {
            let ticket = pool.acquire_selection().unwrap();
            assert_eq!(ticket.backend().address(), "http://10.0.0.1:8081");
            pool.report_outcome(ticket, Outcome::Ok);
        }
    }

    #[test]
    fn test_single_backend_least_response_time() {
        let pool = make_pool(1, StrategyKind::LeastResponseTime);
        for _ in 0..3 {
            let ticket = pool.acquire_selection().unwrap();
            assert_eq!(ticket.backend().address(), "http://10.0.0.1:8081");
            pool.report_outcome(ticket, Outcome::Ok);
        }
    }
}
