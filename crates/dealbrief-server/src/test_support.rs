//! Scripted stages and inert collaborators for runner and router tests.

use std::sync::Arc;

use async_trait::async_trait;
use dealbrief_core::{BranchKind, DocumentKind, RetrievalConfig, SourceDocument};
use dealbrief_pipeline::stages::{
    INITIALIZE, PROSPECT_DISCOVERY, PROSPECT_FETCH, PROSPECT_JOBS, PROSPECT_MACRO_TRENDS,
    PROSPECT_NEWS, SELLER_DISCOVERY, SELLER_FETCH, SELLER_REPORT,
};
use dealbrief_pipeline::{
    BranchDelta, ContentSource, PipelineEngine, Stage, StageContext, StageError, StageTable,
    Submission, SubmissionDelta,
};
use dealbrief_resilience::ServiceError;
use dealbrief_retrieval::{ChatMessage, Completer, Embedder, RetrievalEngine};

struct Inert;

#[async_trait]
impl ContentSource for Inert {
    async fn discover_pages(&self, _site_url: &str) -> Result<Vec<String>, ServiceError> {
        Ok(Vec::new())
    }

    async fn fetch_pages(&self, _urls: &[String]) -> Result<Vec<SourceDocument>, ServiceError> {
        Ok(Vec::new())
    }

    async fn search(
        &self,
        _query: &str,
        _kind: DocumentKind,
        _limit: usize,
    ) -> Result<Vec<SourceDocument>, ServiceError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl Completer for Inert {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ServiceError> {
        Err(ServiceError::Empty("completion".to_string()))
    }
}

#[async_trait]
impl Embedder for Inert {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(vec![vec![1.0]; texts.len()])
    }
}

fn context() -> StageContext {
    let completer: Arc<dyn Completer> = Arc::new(Inert);
    StageContext {
        content: Arc::new(Inert),
        completer: Arc::clone(&completer),
        retrieval: RetrievalEngine::new(RetrievalConfig::default(), Arc::new(Inert), completer),
    }
}

/// Stage that writes a marker into the prospect report, or fails.
pub(crate) struct Scripted {
    name: &'static str,
    fail: bool,
    fatal: bool,
}

#[async_trait]
impl Stage for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_fatal(&self) -> bool {
        self.fatal
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        _submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        if self.fail {
            return Err(StageError::InvalidInput(format!("{} rejected input", self.name)));
        }
        Ok(SubmissionDelta::for_branch(
            BranchKind::Prospect,
            BranchDelta {
                report: Some(format!("report after {}", self.name)),
                ..BranchDelta::default()
            },
        ))
    }
}

/// An engine over the stages that map to UI steps. `fatal_at` makes that
/// stage fail fatally; `failing` makes that stage fail and the run continue.
pub(crate) fn scripted_engine(fatal_at: Option<&str>, failing: Option<&str>) -> PipelineEngine {
    let names = [
        INITIALIZE,
        SELLER_DISCOVERY,
        SELLER_FETCH,
        SELLER_REPORT,
        PROSPECT_DISCOVERY,
        PROSPECT_FETCH,
        PROSPECT_NEWS,
        PROSPECT_JOBS,
        PROSPECT_MACRO_TRENDS,
    ];
    let mut table = StageTable::new();
    let mut previous: Vec<&'static str> = Vec::new();
    for name in names {
        let fatal = fatal_at == Some(name);
        let stage = Scripted {
            name,
            fail: fatal || failing == Some(name),
            fatal,
        };
        table.register(stage, &previous).unwrap();
        previous = vec![name];
    }
    PipelineEngine::new(&table, context()).unwrap()
}

/// Stage whose body panics.
struct Exploding(&'static str);

#[async_trait]
impl Stage for Exploding {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        _submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        panic!("{} blew up", self.0)
    }
}

/// An engine whose `at` stage panics, after scripted stages up to it.
pub(crate) fn panicking_engine(at: &'static str) -> PipelineEngine {
    let names = [INITIALIZE, SELLER_DISCOVERY, SELLER_FETCH];
    let mut table = StageTable::new();
    let mut previous: Vec<&'static str> = Vec::new();
    for name in names {
        if name == at {
            table.register(Exploding(name), &previous).unwrap();
            break;
        }
        let stage = Scripted {
            name,
            fail: false,
            fatal: false,
        };
        table.register(stage, &previous).unwrap();
        previous = vec![name];
    }
    PipelineEngine::new(&table, context()).unwrap()
}
