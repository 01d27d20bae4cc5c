use std::fmt;

/// Stages of a deployment run, in execution order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Config,
    Connect,
    Probe,
    StageDirectory,
    Upload,
    Flash,
    Release,
}

pub const STAGE_COUNT: u32 = 6;

impl Stage {
    /// Position shown to the operator, `None` for stages outside a run.
    pub fn step(&self) -> Option<u32> {
        match self {
            Stage::Config => None,
            Stage::Connect => Some(1),
            Stage::Probe => Some(2),
            Stage::StageDirectory => Some(3),
            Stage::Upload => Some(4),
            Stage::Flash => Some(5),
            Stage::Release => Some(6),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Config => "configuration",
            Stage::Connect => "connect",
            Stage::Probe => "probe",
            Stage::StageDirectory => "stage directory",
            Stage::Upload => "upload",
            Stage::Flash => "flash",
            Stage::Release => "release",
        })
    }
}

pub fn convert_stage_to_str(stage: Stage, detail: &str) -> String {
    let text = match stage {
        Stage::Config => format!("loading config {}", detail),
        Stage::Connect => format!("connecting to {}", detail),
        Stage::Probe => format!("probing {}", detail),
        Stage::StageDirectory => format!("preparing ~/{}", detail),
        Stage::Upload => format!("uploading {}", detail),
        Stage::Flash => format!("flashing {}", detail),
        Stage::Release => format!("closing session to {}", detail),
    };

    match stage.step() {
        Some(step) => format!("[{}/{}] {}", step, STAGE_COUNT, text),
        None => text,
    }
}

/// Receives stage transitions of a run, for progress display.
pub trait StageObserver: Send + Sync {
    fn stage_started(&self, target: &str, stage: Stage, detail: &str);
}

/// Observer that drops every notification.
pub struct SilentObserver;

impl StageObserver for SilentObserver {
    fn stage_started(&self, _target: &str, _stage: Stage, _detail: &str) {}
}
