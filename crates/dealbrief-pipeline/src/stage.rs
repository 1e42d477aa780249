use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dealbrief_retrieval::{Completer, RetrievalEngine};

use crate::error::{PipelineError, StageError};
use crate::source::ContentSource;
use crate::state::{Submission, SubmissionDelta};

/// Collaborators every stage may call.
#[derive(Clone)]
pub struct StageContext {
    pub content: Arc<dyn ContentSource>,
    pub completer: Arc<dyn Completer>,
    pub retrieval: RetrievalEngine,
}

/// A named unit of pipeline work.
///
/// `execute` reads the submission as left by earlier stages and returns only
/// what it produced.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// A failing fatal stage aborts the run instead of being recorded.
    fn is_fatal(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError>;
}

struct Registered {
    stage: Arc<dyn Stage>,
    after: Vec<&'static str>,
}

/// Stages and their predecessor edges.
#[derive(Default)]
pub struct StageTable {
    stages: Vec<Registered>,
}

impl StageTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `stage`, to run after every stage named in `after`. Predecessors
    /// may be registered later; edges are checked by
    /// [`topological_order`](Self::topological_order).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateStage`] if the name is taken.
    pub fn register(
        &mut self,
        stage: impl Stage + 'static,
        after: &[&'static str],
    ) -> Result<&mut Self, PipelineError> {
        if self.stages.iter().any(|r| r.stage.name() == stage.name()) {
            return Err(PipelineError::DuplicateStage(stage.name().to_string()));
        }
        self.stages.push(Registered {
            stage: Arc::new(stage),
            after: after.to_vec(),
        });
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|r| r.stage.name()).collect()
    }

    /// Kahn's algorithm. Among stages that are ready at the same time, the
    /// one registered first runs first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownDependency`] for an edge to an
    /// unregistered stage and [`PipelineError::Cycle`] if the edges loop.
    pub fn topological_order(&self) -> Result<Vec<Arc<dyn Stage>>, PipelineError> {
        let index: HashMap<&str, usize> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, r)| (r.stage.name(), i))
            .collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.stages.len()];
        let mut in_degree: Vec<usize> = vec![0; self.stages.len()];
        for (to, registered) in self.stages.iter().enumerate() {
            for dependency in &registered.after {
                let from = *index.get(dependency).ok_or_else(|| {
                    PipelineError::UnknownDependency {
                        stage: registered.stage.name().to_string(),
                        dependency: (*dependency).to_string(),
                    }
                })?;
                dependents[from].push(to);
                in_degree[to] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.stages.len());

        while let Some(next) = ready.pop_first() {
            order.push(Arc::clone(&self.stages[next].stage));
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.stages.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| self.stages[i].stage.name())
                .collect();
            return Err(PipelineError::Cycle(stuck.join(", ")));
        }
        Ok(order)
    }
}
