use std::sync::{Arc, Mutex};

use crate::{
    error::ActuationError,
    ports::{Actuator, IndicatorOutput, Presenter, Submission},
    types::{DisplaySnapshot, HvacCommand},
};

#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    pub commands: Arc<Mutex<Vec<HvacCommand>>>,
    pub link_down: bool,
}

impl RecordingActuator {
    pub fn commands(&self) -> Vec<HvacCommand> {
        self.commands.lock().unwrap().clone()
    }
}

impl Actuator for RecordingActuator {
    fn submit(&self, command: HvacCommand) -> Result<Submission, ActuationError> {
        if self.link_down {
            return Err(ActuationError::LinkDown);
        }
        self.commands.lock().unwrap().push(command);
        Ok(Submission::Queued)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    pub frames: Arc<Mutex<Vec<DisplaySnapshot>>>,
}

impl RecordingPresenter {
    pub fn frames(&self) -> Vec<DisplaySnapshot> {
        self.frames.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn render(&self, snapshot: &DisplaySnapshot) {
        self.frames.lock().unwrap().push(*snapshot);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingIndicator {
    pub levels: Arc<Mutex<Vec<bool>>>,
}

impl RecordingIndicator {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().unwrap().clone()
    }
}

impl IndicatorOutput for RecordingIndicator {
    fn set_paired(&mut self, on: bool) {
        self.levels.lock().unwrap().push(on);
    }
}
