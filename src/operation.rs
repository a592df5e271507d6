use std::fmt::Debug;

use log::{debug, info, warn};

use crate::core::{CommError, Controller, ErrorClass, Transport};

pub(crate) const LOG_TARGET: &str = "roadlink::link";

/// Scheduling priority of an operation on its link; higher priorities run first.
///
/// # Examples
///
/// ```
/// use roadlink::Priority;
///
/// assert!(Priority::Command > Priority::Download);
/// assert!(Priority::Poll > Priority::Idle);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Background work such as listening for pushed events.
    Idle,

    /// Periodic polling for samples or status.
    Poll,

    /// Device requests such as querying configuration.
    Device,

    /// Downloading settings to a device.
    Download,

    /// Operator commands such as sending a sign message.
    Command,
}

/// How many failed attempts an operation may retry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RetryPolicy {
    /// Retry up to this many times after the first failure.
    Limited(u32),

    /// Retry forever.
    Unbounded,
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `failures` failed ones.
    ///
    /// # Examples
    ///
    /// ```
    /// use roadlink::RetryPolicy;
    ///
    /// assert!(RetryPolicy::Limited(2).allows_retry(2));
    /// assert!(!RetryPolicy::Limited(2).allows_retry(3));
    /// assert!(RetryPolicy::Unbounded.allows_retry(1000));
    /// ```
    pub fn allows_retry(self, failures: u32) -> bool {
        match self {
            RetryPolicy::Limited(limit) => failures <= limit,
            RetryPolicy::Unbounded => true,
        }
    }
}

/// One logical exchange with a device, written as an explicit state machine.
///
/// Each phase performs one request/response step and returns the next phase, or `None`
/// when the transaction is complete. Phases own whatever data they need to carry forward,
/// and anything that must outlive a phase lives in the transaction itself.
pub trait Transaction: Debug + Send {
    /// The states of this transaction.
    type Phase: Debug + Send;

    /// Short name of the transaction, used with the controller name to describe it.
    fn name(&self) -> &'static str;

    /// The controller this transaction talks to and reports to.
    fn controller(&self) -> &dyn Controller;

    /// Returns the first phase of an attempt.
    fn begin(&mut self) -> Self::Phase;

    /// Performs one phase.
    ///
    /// # Errors
    ///
    /// Returns the [`CommError`] that failed this attempt.
    fn poll(&mut self, phase: Self::Phase, transport: &mut dyn Transport) -> Result<Option<Self::Phase>, CommError>;

    /// Called once when the transaction finally succeeds or is abandoned.
    fn cleanup(&mut self, _success: bool) {}

    /// Whether the transaction starts over after completing instead of finishing.
    fn is_perpetual(&self) -> bool {
        false
    }
}

/// A [`Transaction`] that needs to read the device configuration before doing its work.
pub trait Configure: Transaction {
    /// Returns the first phase of reading the configuration.
    fn configure(&mut self) -> Self::Phase;
}

/// Phase of a [`ConfigGuard`]: either reading configuration or doing the real work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Guarded<P> {
    /// Reading the device configuration.
    Configure(P),

    /// Doing the guarded work.
    Work(P),
}

/// Runs a [`Configure`] transaction's configuration phases first whenever the controller
/// isn't known to be configured, then marks it configured and starts the real work.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use roadlink::g4::OpQueryStats;
/// use roadlink::{ConfigGuard, Guarded, Transaction};
/// use roadlink_core::DropAddress;
/// use roadlink_testing::MockController;
///
/// let controller = Arc::new(MockController::new("ctl_1", DropAddress(1)));
/// let mut guard = ConfigGuard::new(OpQueryStats::new(controller));
/// assert!(matches!(guard.begin(), Guarded::Configure(_)));
/// ```
#[derive(Debug)]
pub struct ConfigGuard<T> {
    inner: T,
}

impl<T: Configure> ConfigGuard<T> {
    /// Wraps `inner`.
    pub fn new(inner: T) -> Self {
        ConfigGuard { inner }
    }

    /// The wrapped transaction.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Configure> Transaction for ConfigGuard<T> {
    type Phase = Guarded<T::Phase>;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn controller(&self) -> &dyn Controller {
        self.inner.controller()
    }

    fn begin(&mut self) -> Self::Phase {
        if self.inner.controller().is_configured() {
            Guarded::Work(self.inner.begin())
        } else {
            debug!(target: LOG_TARGET, "{}: reading configuration", self.inner.controller().name());
            Guarded::Configure(self.inner.configure())
        }
    }

    fn poll(&mut self, phase: Self::Phase, transport: &mut dyn Transport) -> Result<Option<Self::Phase>, CommError> {
        match phase {
            Guarded::Configure(phase) => match self.inner.poll(phase, transport)? {
                Some(next) => Ok(Some(Guarded::Configure(next))),
                None => {
                    self.inner.controller().set_configured(true);
                    Ok(Some(Guarded::Work(self.inner.begin())))
                }
            },
            Guarded::Work(phase) => Ok(self.inner.poll(phase, transport)?.map(Guarded::Work)),
        }
    }

    fn cleanup(&mut self, success: bool) {
        self.inner.cleanup(success)
    }

    fn is_perpetual(&self) -> bool {
        self.inner.is_perpetual()
    }
}

/// Result of stepping an [`Operation`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Progress {
    /// More phases remain; step again.
    Continue,

    /// The operation finished successfully.
    Done,

    /// A perpetual operation finished one round and should be queued again.
    Yield,
}

/// What to do with an operation after a failed attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Queue it again at its priority.
    Retry,

    /// Drop it; it has already cleaned up.
    Abandon,
}

/// A queued unit of work on a link, as seen by the [`OpQueue`](crate::OpQueue) and
/// [`LinkWorker`](crate::LinkWorker).
pub trait Operation: Debug + Send {
    /// Identifies the operation; the queue refuses a second operation with the same description.
    fn description(&self) -> String;

    /// Current scheduling priority.
    fn priority(&self) -> Priority;

    /// Performs the next phase.
    ///
    /// # Errors
    ///
    /// Returns the [`CommError`] that failed this attempt; the caller must then call
    /// [`fail`](Self::fail).
    fn step(&mut self, transport: &mut dyn Transport) -> Result<Progress, CommError>;

    /// Records a failed attempt and decides whether to retry.
    fn fail(&mut self, error: &CommError) -> Disposition;

    /// Gives up without another attempt, e.g. because the link is shutting down.
    fn abandon(&mut self);

    /// Whether the operation has finished, successfully or not.
    fn is_done(&self) -> bool;

    /// Whether the operation finished successfully.
    fn is_success(&self) -> bool;
}

/// Drives a [`Transaction`] with a priority and a retry budget.
///
/// On success the controller's communication failure state is cleared. When the retry
/// budget runs out it is set instead. A [protocol error](ErrorClass::Protocol) means
/// the exchange can never work as configured, so it abandons the operation immediately.
#[derive(Debug)]
pub struct Op<T: Transaction> {
    txn: T,
    priority: Priority,
    retry: RetryPolicy,
    phase: Option<T::Phase>,
    failures: u32,
    success: bool,
    done: bool,
}

impl<T: Transaction> Op<T> {
    /// Creates an operation that hasn't started.
    pub fn new(txn: T, priority: Priority, retry: RetryPolicy) -> Self {
        Op {
            txn,
            priority,
            retry,
            phase: None,
            failures: 0,
            success: false,
            done: false,
        }
    }

    /// The driven transaction.
    pub fn transaction(&self) -> &T {
        &self.txn
    }

    /// Number of failed attempts since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn finish(&mut self, success: bool) {
        self.success = success;
        self.done = true;
        self.txn.cleanup(success);
    }
}

impl<T: Transaction> Operation for Op<T> {
    fn description(&self) -> String {
        format!("{} {}", self.txn.name(), self.txn.controller().name())
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn step(&mut self, transport: &mut dyn Transport) -> Result<Progress, CommError> {
        if self.done {
            return Ok(Progress::Done);
        }
        let phase = match self.phase.take() {
            Some(phase) => phase,
            None => self.txn.begin(),
        };
        debug!(target: LOG_TARGET, "{}: {:?}", self.description(), phase);
        match self.txn.poll(phase, transport)? {
            Some(next) => {
                self.phase = Some(next);
                Ok(Progress::Continue)
            }
            None if self.txn.is_perpetual() => {
                self.failures = 0;
                self.priority = Priority::Idle;
                Ok(Progress::Yield)
            }
            None => {
                info!(target: LOG_TARGET, "{}: done", self.description());
                self.txn.controller().set_comm_failed(false);
                self.finish(true);
                Ok(Progress::Done)
            }
        }
    }

    fn fail(&mut self, error: &CommError) -> Disposition {
        self.phase = None;
        let description = self.description();
        if error.class() == ErrorClass::Protocol {
            warn!(target: LOG_TARGET, "{}: {}, abandoning", description, error);
            self.txn.controller().set_error_status(&error.to_string());
            self.finish(false);
            return Disposition::Abandon;
        }
        self.failures += 1;
        if self.retry.allows_retry(self.failures) {
            info!(target: LOG_TARGET, "{}: {}, retry {}", description, error, self.failures);
            Disposition::Retry
        } else {
            warn!(
                target: LOG_TARGET,
                "{}: {}, giving up after {} attempts", description, error, self.failures
            );
            self.txn.controller().set_comm_failed(true);
            self.finish(false);
            Disposition::Abandon
        }
    }

    fn abandon(&mut self) {
        if !self.done {
            debug!(target: LOG_TARGET, "{}: abandoned", self.description());
            self.phase = None;
            self.finish(false);
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn is_success(&self) -> bool {
        self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use roadlink_core::DropAddress;
    use roadlink_testing::{ControllerCall, MockController, ScriptedTransport};

    #[derive(Debug)]
    enum CountPhase {
        ReadConfig,
        Count(u8),
    }

    #[derive(Debug)]
    struct Countdown {
        controller: Arc<MockController>,
        steps: u8,
        errors: Vec<CommError>,
        cleaned: Option<bool>,
    }

    impl Countdown {
        fn new(controller: Arc<MockController>, steps: u8) -> Self {
            Countdown {
                controller,
                steps,
                errors: Vec::new(),
                cleaned: None,
            }
        }
    }

    impl Transaction for Countdown {
        type Phase = CountPhase;

        fn name(&self) -> &'static str {
            "Countdown"
        }

        fn controller(&self) -> &dyn Controller {
            self.controller.as_ref()
        }

        fn begin(&mut self) -> CountPhase {
            CountPhase::Count(self.steps)
        }

        fn poll(&mut self, phase: CountPhase, _transport: &mut dyn Transport) -> Result<Option<CountPhase>, CommError> {
            if let Some(error) = self.errors.pop() {
                return Err(error);
            }
            Ok(match phase {
                CountPhase::ReadConfig | CountPhase::Count(0) => None,
                CountPhase::Count(n) => Some(CountPhase::Count(n - 1)),
            })
        }

        fn cleanup(&mut self, success: bool) {
            self.cleaned = Some(success);
        }
    }

    impl Configure for Countdown {
        fn configure(&mut self) -> CountPhase {
            CountPhase::ReadConfig
        }
    }

    fn timeout() -> CommError {
        CommError::Timeout {
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn priorities_are_ordered() {
        let mut priorities = vec![Priority::Poll, Priority::Command, Priority::Idle, Priority::Download, Priority::Device];
        priorities.sort();
        assert_eq!(
            vec![Priority::Idle, Priority::Poll, Priority::Device, Priority::Download, Priority::Command],
            priorities
        );
    }

    #[test]
    fn runs_phases_to_completion() {
        let controller = Arc::new(MockController::new("ctl", DropAddress(1)));
        let mut op = Op::new(Countdown::new(controller.clone(), 2), Priority::Poll, RetryPolicy::Limited(1));
        let mut transport = ScriptedTransport::new();
        assert_eq!(Progress::Continue, op.step(&mut transport).unwrap());
        assert_eq!(Progress::Continue, op.step(&mut transport).unwrap());
        assert_eq!(Progress::Done, op.step(&mut transport).unwrap());
        assert!(op.is_success());
        assert_eq!(Some(true), op.transaction().cleaned);
        assert_eq!(vec![ControllerCall::CommFailed(false)], controller.calls());
    }

    #[test]
    fn exhausted_retries_mark_comm_failed() {
        let controller = Arc::new(MockController::new("ctl", DropAddress(1)));
        let mut op = Op::new(Countdown::new(controller.clone(), 0), Priority::Poll, RetryPolicy::Limited(1));
        assert_eq!(Disposition::Retry, op.fail(&timeout()));
        assert_eq!(Disposition::Abandon, op.fail(&timeout()));
        assert!(op.is_done());
        assert!(!op.is_success());
        assert_eq!(Some(false), op.transaction().cleaned);
        assert_eq!(Some(true), controller.comm_failed());
    }

    #[test]
    fn protocol_error_abandons_immediately() {
        let controller = Arc::new(MockController::new("ctl", DropAddress(1)));
        let mut op = Op::new(Countdown::new(controller.clone(), 0), Priority::Poll, RetryPolicy::Unbounded);
        assert_eq!(Disposition::Abandon, op.fail(&CommError::protocol("SEQUENCE")));
        assert_eq!(None, controller.comm_failed());
    }

    #[test]
    fn failed_attempt_restarts_from_first_phase() {
        let controller = Arc::new(MockController::new("ctl", DropAddress(1)));
        let mut countdown = Countdown::new(controller, 1);
        countdown.errors.push(timeout());
        let mut op = Op::new(countdown, Priority::Poll, RetryPolicy::Limited(3));
        let mut transport = ScriptedTransport::new();
        let error = op.step(&mut transport).unwrap_err();
        assert_eq!(Disposition::Retry, op.fail(&error));
        assert_eq!(Progress::Continue, op.step(&mut transport).unwrap());
        assert_eq!(Progress::Done, op.step(&mut transport).unwrap());
    }

    #[test]
    fn guard_configures_unconfigured_device_first() {
        let controller = Arc::new(MockController::new("ctl", DropAddress(1)));
        let mut guard = ConfigGuard::new(Countdown::new(controller.clone(), 0));
        let mut transport = ScriptedTransport::new();
        let phase = guard.begin();
        assert!(matches!(phase, Guarded::Configure(CountPhase::ReadConfig)));
        let phase = guard.poll(phase, &mut transport).unwrap().unwrap();
        assert!(matches!(phase, Guarded::Work(CountPhase::Count(0))));
        assert!(controller.is_configured());
        assert!(guard.poll(phase, &mut transport).unwrap().is_none());
    }

    #[test]
    fn guard_skips_configuration_when_known() {
        let controller = Arc::new(MockController::new("ctl", DropAddress(1)).with_configured(true));
        let mut guard = ConfigGuard::new(Countdown::new(controller, 0));
        assert!(matches!(guard.begin(), Guarded::Work(_)));
    }
}
