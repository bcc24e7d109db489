// Extension records threaded into a pipeline descriptor
//
// Instead of patching `p_next` pointers while the description is being
// assembled, every optional extension is kept as a tagged record in an
// insertion-ordered list. The device backend flattens the list into the
// native chain in a single step right before the creation call.

use super::state::{FragmentShadingRateState, PipelineRobustness, RenderingFormats};
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Creation feedback reported by the driver for one pipeline object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationFeedback {
    pub flags: vk::PipelineCreationFeedbackFlags,
    pub duration_ns: u64,
    pub stages: Vec<(vk::PipelineCreationFeedbackFlags, u64)>,
}

/// Shared slot the backend writes creation feedback into.
#[derive(Debug, Clone, Default)]
pub struct FeedbackSink(Arc<Mutex<Option<CreationFeedback>>>);

impl FeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, feedback: CreationFeedback) {
        *self.0.lock() = Some(feedback);
    }

    pub fn get(&self) -> Option<CreationFeedback> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone)]
pub enum ChainRecord {
    /// Marks a library part and which phase it carries
    LibraryInfo(vk::GraphicsPipelineLibraryFlagsEXT),
    FragmentShadingRate(FragmentShadingRateState),
    Rendering(RenderingFormats),
    RepresentativeFragmentTest { enable: bool },
    Robustness(PipelineRobustness),
    CreationFeedback { sink: FeedbackSink, stage_count: u32 },
}

/// Discriminant used for de-duplication and flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    LibraryInfo,
    FragmentShadingRate,
    Rendering,
    RepresentativeFragmentTest,
    Robustness,
    CreationFeedback,
}

impl ChainRecord {
    pub fn kind(&self) -> ChainKind {
        match self {
            Self::LibraryInfo(_) => ChainKind::LibraryInfo,
            Self::FragmentShadingRate(_) => ChainKind::FragmentShadingRate,
            Self::Rendering(_) => ChainKind::Rendering,
            Self::RepresentativeFragmentTest { .. } => ChainKind::RepresentativeFragmentTest,
            Self::Robustness(_) => ChainKind::Robustness,
            Self::CreationFeedback { .. } => ChainKind::CreationFeedback,
        }
    }
}

/// Insertion-ordered set of extension records, at most one per kind.
#[derive(Debug, Clone, Default)]
pub struct ExtensionChain {
    records: Vec<ChainRecord>,
}

impl ExtensionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. A record of a kind already present replaces it in place.
    pub fn push(&mut self, record: ChainRecord) -> &mut Self {
        let kind = record.kind();
        match self.records.iter_mut().find(|r| r.kind() == kind) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self
    }

    pub fn push_opt(&mut self, record: Option<ChainRecord>) -> &mut Self {
        if let Some(record) = record {
            self.push(record);
        }
        self
    }

    pub fn extend(&mut self, other: &ExtensionChain) -> &mut Self {
        for record in &other.records {
            self.push(record.clone());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainRecord> {
        self.records.iter()
    }

    pub fn kinds(&self) -> Vec<ChainKind> {
        self.records.iter().map(ChainRecord::kind).collect()
    }

    pub fn find(&self, kind: ChainKind) -> Option<&ChainRecord> {
        self.records.iter().find(|r| r.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut chain = ExtensionChain::new();
        chain
            .push(ChainRecord::Rendering(RenderingFormats::default()))
            .push(ChainRecord::RepresentativeFragmentTest { enable: true })
            .push(ChainRecord::FragmentShadingRate(FragmentShadingRateState::default()));

        assert_eq!(
            chain.kinds(),
            vec![
                ChainKind::Rendering,
                ChainKind::RepresentativeFragmentTest,
                ChainKind::FragmentShadingRate
            ]
        );
    }

    #[test]
    fn same_kind_replaces_in_place() {
        let mut chain = ExtensionChain::new();
        chain
            .push(ChainRecord::RepresentativeFragmentTest { enable: false })
            .push(ChainRecord::Robustness(PipelineRobustness::default()))
            .push(ChainRecord::RepresentativeFragmentTest { enable: true });

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.kinds()[0], ChainKind::RepresentativeFragmentTest);
        assert!(matches!(
            chain.find(ChainKind::RepresentativeFragmentTest),
            Some(ChainRecord::RepresentativeFragmentTest { enable: true })
        ));
    }

    #[test]
    fn feedback_sink_is_shared_between_clones() {
        let sink = FeedbackSink::new();
        let mut chain = ExtensionChain::new();
        chain.push(ChainRecord::CreationFeedback { sink: sink.clone(), stage_count: 2 });

        if let Some(ChainRecord::CreationFeedback { sink: stored, .. }) = chain.find(ChainKind::CreationFeedback) {
            stored.store(CreationFeedback { duration_ns: 42, ..Default::default() });
        }
        assert_eq!(sink.get().map(|f| f.duration_ns), Some(42));
    }
}
