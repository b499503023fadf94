//! Generic table-free state-machine engine shared by the boot master and the
//! per-node boot workers.
//!
//! A machine holds a tagged state, a run mode and a per-state phase counter.
//! Behaviour lives in a *step* closure supplied by the owner: it receives the
//! machine plus an external context and returns an [`Action`]. Asynchronous
//! waits are expressed by returning [`Action::Stay`] after issuing a request;
//! the event loop resumes the same state later through [`StateMachine::run`].
//! [`StateMachine::is_first_entry`] distinguishes "issue the request" from
//! "inspect its completion" inside a single state handler.

use core::fmt::Debug;
use log::error;

/// Upper bound on synchronous state switches within one external call.
/// Several boot states resolve without any asynchronous wait and cascade
/// directly into the next; the bound keeps a buggy step function from
/// spinning forever.
const MAX_CASCADE_DEPTH: usize = 32;

/// Lifecycle of a machine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Initialised but not yet started.
    Init,
    /// Started; states execute and may switch.
    Running,
    /// Terminated; all further entry points are no-ops.
    Stopped,
}

/// What a step function wants done after handling the current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<S> {
    /// Remain in the current state (typically: an asynchronous request is in
    /// flight and the state will be re-entered on completion).
    Stay,
    /// Enter `S`, reset the phase counter and execute the new state at once.
    Switch(S),
    /// Terminate the machine.
    Stop,
}

/// A generic state machine instance carrying its per-machine data `D`.
#[derive(Debug)]
pub struct StateMachine<S, D> {
    mode: RunMode,
    state: S,
    phase: u32,
    /// Machine-specific data, freely accessible to the step function.
    pub data: D,
}

impl<S: Copy + PartialEq + Debug, D> StateMachine<S, D> {
    /// Creates a machine in `RunMode::Init` at `initial`.
    pub fn new(initial: S, data: D) -> Self {
        Self {
            mode: RunMode::Init,
            state: initial,
            phase: 0,
            data,
        }
    }

    /// Re-arms the machine at `initial` for another run. Machine data is left
    /// untouched; resetting it is the owner's responsibility.
    pub fn init(&mut self, initial: S) {
        self.mode = RunMode::Init;
        self.state = initial;
        self.phase = 0;
    }

    /// Current state.
    pub fn state(&self) -> S {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.mode == RunMode::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.mode == RunMode::Stopped
    }

    /// Returns true exactly once per state entry: the phase counter is
    /// compared against zero and incremented as a side effect of the query.
    pub fn is_first_entry(&mut self) -> bool {
        let first = self.phase == 0;
        self.phase = self.phase.wrapping_add(1);
        first
    }

    /// Starts the machine if (and only if) it has not been started yet, and
    /// executes the current state once.
    pub fn start<C, F>(&mut self, ctx: &mut C, step: F)
    where
        F: FnMut(&mut Self, &mut C) -> Action<S>,
    {
        if self.mode != RunMode::Init {
            return;
        }
        self.mode = RunMode::Running;
        self.drive(ctx, step);
    }

    /// Re-executes the current state without changing it, used by completion
    /// callbacks and periodic polls. A stopped machine ignores the call: a
    /// late callback for a cancelled machine must stay harmless.
    pub fn run<C, F>(&mut self, ctx: &mut C, step: F)
    where
        F: FnMut(&mut Self, &mut C) -> Action<S>,
    {
        if self.mode == RunMode::Stopped {
            return;
        }
        self.mode = RunMode::Running;
        self.drive(ctx, step);
    }

    /// Terminates the machine. In-flight asynchronous requests are not
    /// cancelled; their completions are discarded by `run`.
    pub fn stop(&mut self) {
        self.mode = RunMode::Stopped;
    }

    fn drive<C, F>(&mut self, ctx: &mut C, mut step: F)
    where
        F: FnMut(&mut Self, &mut C) -> Action<S>,
    {
        for _ in 0..MAX_CASCADE_DEPTH {
            match step(self, ctx) {
                Action::Stay => return,
                Action::Stop => {
                    self.mode = RunMode::Stopped;
                    return;
                }
                Action::Switch(next) => {
                    // Switching is only legal while running.
                    if self.mode != RunMode::Running {
                        return;
                    }
                    self.state = next;
                    self.phase = 0;
                }
            }
        }
        error!(
            "State machine exceeded {} synchronous switches in state {:?}; cascade aborted",
            MAX_CASCADE_DEPTH, self.state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestState {
        A,
        B,
        C,
    }

    #[test]
    fn test_first_entry_exactly_once_per_state() {
        let mut sm: StateMachine<TestState, u32> = StateMachine::new(TestState::A, 0);
        // Step: count first entries in data, stay forever.
        let step = |sm: &mut StateMachine<TestState, u32>, _: &mut ()| {
            if sm.is_first_entry() {
                sm.data += 1;
            }
            Action::Stay
        };
        sm.start(&mut (), step);
        // Arbitrary interleaving of run calls never re-reports a first entry.
        for _ in 0..5 {
            sm.run(&mut (), step);
        }
        assert_eq!(sm.data, 1);
    }

    #[test]
    fn test_switch_resets_first_entry() {
        let mut sm: StateMachine<TestState, u32> = StateMachine::new(TestState::A, 0);
        let step = |sm: &mut StateMachine<TestState, u32>, _: &mut ()| {
            if sm.is_first_entry() {
                sm.data += 1;
                if sm.state() == TestState::A {
                    return Action::Switch(TestState::B);
                }
            }
            Action::Stay
        };
        sm.start(&mut (), step);
        assert_eq!(sm.state(), TestState::B);
        // One first entry in A, one in B.
        assert_eq!(sm.data, 2);
        sm.run(&mut (), step);
        assert_eq!(sm.data, 2);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut sm: StateMachine<TestState, u32> = StateMachine::new(TestState::A, 0);
        let step = |sm: &mut StateMachine<TestState, u32>, _: &mut ()| {
            sm.data += 1;
            Action::Stay
        };
        sm.start(&mut (), step);
        sm.start(&mut (), step);
        assert_eq!(sm.data, 1);
    }

    #[test]
    fn test_stopped_machine_ignores_run() {
        let mut sm: StateMachine<TestState, u32> = StateMachine::new(TestState::A, 0);
        let step = |sm: &mut StateMachine<TestState, u32>, _: &mut ()| {
            sm.data += 1;
            Action::Stop
        };
        sm.start(&mut (), step);
        assert!(sm.is_stopped());
        sm.run(&mut (), step);
        assert_eq!(sm.data, 1, "late callback must not revive a stopped machine");
    }

    #[test]
    fn test_cascade_runs_through_states() {
        let mut sm: StateMachine<TestState, u32> = StateMachine::new(TestState::A, 0);
        let step = |sm: &mut StateMachine<TestState, u32>, _: &mut ()| match sm.state() {
            TestState::A => Action::Switch(TestState::B),
            TestState::B => Action::Switch(TestState::C),
            TestState::C => Action::Stop,
        };
        sm.start(&mut (), step);
        assert_eq!(sm.state(), TestState::C);
        assert!(sm.is_stopped());
    }

    #[test]
    fn test_cascade_bound_terminates() {
        let mut sm: StateMachine<TestState, u32> = StateMachine::new(TestState::A, 0);
        // Pathological step that always switches; must not loop forever.
        let step = |sm: &mut StateMachine<TestState, u32>, _: &mut ()| {
            sm.data += 1;
            Action::Switch(TestState::A)
        };
        sm.start(&mut (), step);
        assert_eq!(sm.data as usize, MAX_CASCADE_DEPTH);
        assert!(sm.is_running());
    }

    #[test]
    fn test_reinit_after_stop_allows_restart() {
        let mut sm: StateMachine<TestState, u32> = StateMachine::new(TestState::A, 0);
        let step = |_: &mut StateMachine<TestState, u32>, _: &mut ()| Action::Stop;
        sm.start(&mut (), step);
        assert!(sm.is_stopped());
        sm.init(TestState::A);
        let step2 = |sm: &mut StateMachine<TestState, u32>, _: &mut ()| {
            if sm.is_first_entry() {
                sm.data += 1;
            }
            Action::Stay
        };
        sm.start(&mut (), step2);
        assert!(sm.is_running());
        assert_eq!(sm.data, 1);
    }
}
