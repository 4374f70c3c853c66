use std::fmt;

/// Stages of the flash state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    KValueEstimate,
    SuccessiveSubstitution,
    NewtonRefine,
    StabilityCheck,
    AddPhase,
    Converged,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::KValueEstimate => "k-value estimate",
            Stage::SuccessiveSubstitution => "successive substitution",
            Stage::NewtonRefine => "newton refine",
            Stage::StabilityCheck => "stability check",
            Stage::AddPhase => "add phase",
            Stage::Converged => "converged",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Events emitted to a flash observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlashEvent {
    /// The solver moved to a new stage.
    StageEntered { stage: Stage, iterations: usize },

    /// One successive-substitution or Newton iteration finished.
    Iteration {
        stage: Stage,
        iteration: usize,
        phase_count: usize,
        residual: f64,
    },
}

impl FlashEvent {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            FlashEvent::StageEntered { stage, .. } | FlashEvent::Iteration { stage, .. } => *stage,
        }
    }
}

/// Control actions a flash observer may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop and return the current estimate with [`Status::StoppedEarly`].
    ///
    /// [`Status::StoppedEarly`]: super::Status::StoppedEarly
    StopEarly,
}
