// test_utils - In-memory collaborators for tests and benchmarks
//
// Available in test builds and with the `test-support` feature.

pub mod fixture_workspace;
pub mod mock_tracker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::providers::{
    Annotation, AnnotationSink, BufferId, BufferSnapshot, BufferSource, FileLister,
};

/// Buffers held in a map; removing one makes it invalid
#[derive(Debug, Default)]
pub struct MemoryBuffers {
    buffers: Mutex<HashMap<BufferId, BufferSnapshot>>,
}

impl MemoryBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, buffer: BufferId, text: impl Into<String>, language: Option<&str>) {
        self.buffers
            .lock()
            .unwrap()
            .insert(buffer, BufferSnapshot::new(text, language));
    }

    pub fn remove(&self, buffer: BufferId) {
        self.buffers.lock().unwrap().remove(&buffer);
    }
}

impl BufferSource for MemoryBuffers {
    fn snapshot(&self, buffer: BufferId) -> Option<BufferSnapshot> {
        self.buffers.lock().unwrap().get(&buffer).cloned()
    }

    fn is_valid(&self, buffer: BufferId) -> bool {
        self.buffers.lock().unwrap().contains_key(&buffer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Render(BufferId, Vec<Annotation>),
    Clear(BufferId),
}

/// Records every render and clear in call order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn renders_for(&self, buffer: BufferId) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Render(id, _) if *id == buffer))
            .count()
    }
}

impl AnnotationSink for RecordingSink {
    fn render(&self, buffer: BufferId, annotations: Vec<Annotation>) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Render(buffer, annotations));
    }

    fn clear(&self, buffer: BufferId) {
        self.events.lock().unwrap().push(SinkEvent::Clear(buffer));
    }
}

/// Returns a fixed file list, or a fixed error
#[derive(Debug, Clone)]
pub struct StaticFileLister {
    result: Result<Vec<PathBuf>, String>,
}

impl StaticFileLister {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { result: Ok(files) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl FileLister for StaticFileLister {
    async fn list_tracked_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        self.result.clone().map_err(anyhow::Error::msg)
    }
}
