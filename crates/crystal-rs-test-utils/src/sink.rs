use crystal_rs_protocol::{EventSink, PipelineEvent, PipelineStage};
use parking_lot::Mutex;

/// Event sink that keeps every emitted event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    /// Events of one run, in emission order.
    pub fn events_for(&self, run_id: &str) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn stages_for(&self, run_id: &str) -> Vec<PipelineStage> {
        self.events_for(run_id)
            .into_iter()
            .map(|event| event.stage)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().push(event);
    }
}
