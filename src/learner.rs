//! Model learning and selection.
//!
//! Every column has a [`Learner`] that watches one or more passes over the
//! data and finally proposes one or more [`Candidate`] models. The cheapest
//! candidate, counting both its description and the estimated bits of the
//! values it codes, wins.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::attr::{AttrType, AttrValue, Schema};
use crate::categorical::CategoricalLearner;
use crate::config::CompressionConfig;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::numerical::LaplaceLearner;
use crate::string::StringLearner;

/// A learner for one column.
pub trait Learner: std::fmt::Debug {
    /// Observe one tuple of the current pass.
    fn feed_tuple(&mut self, tuple: &[AttrValue]) -> Result<()>;

    /// The current pass is over.
    fn end_of_data(&mut self);

    /// Whether another pass is needed.
    fn require_more_iterations(&self) -> bool;

    /// Whether the next pass must see every tuple.
    fn require_full_pass(&self) -> bool;

    /// Propose models; at least one on success.
    fn finish(self: Box<Self>) -> Result<Vec<Candidate>>;
}

/// A model proposal with its estimated coding cost.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// The proposed model.
    pub model: Model,
    /// Estimated bits to code the observed values.
    pub coding_bits: f64,
}

impl Candidate {
    /// Wrap a model and its coding estimate.
    pub fn new(model: Model, coding_bits: f64) -> Self {
        Self { model, coding_bits }
    }

    /// Bits of the serialized model.
    pub fn description_bits(&self) -> usize {
        self.model.description_bits()
    }

    /// Description plus coding bits.
    pub fn cost(&self) -> f64 {
        self.description_bits() as f64 + self.coding_bits
    }
}

/// Pick the cheapest candidate.
pub fn select_cheapest(column: usize, candidates: Vec<Candidate>) -> Result<Model> {
    let best = candidates
        .into_iter()
        .min_by(|a, b| a.cost().total_cmp(&b.cost()))
        .ok_or_else(|| Error::Config(format!("no model can represent column {column}")))?;
    info!(
        column,
        kind = best.model.kind_name(),
        description_bits = best.description_bits(),
        coding_bits = best.coding_bits,
        "selected model"
    );
    Ok(best.model)
}

/// Learners for every column of a schema.
#[derive(Debug)]
pub struct ModelLearner {
    learners: Vec<Box<dyn Learner>>,
    pass: u32,
}

impl ModelLearner {
    /// Create one learner per column as `config` describes.
    pub fn new(schema: &Schema, config: &CompressionConfig) -> Result<Self> {
        config.validate(schema)?;
        let mut learners: Vec<Box<dyn Learner>> = Vec::with_capacity(schema.len());
        for (column, (&attr_type, column_config)) in
            schema.attr_types().iter().zip(config.columns()).enumerate()
        {
            let predictors = column_config.predictors.clone();
            let learner: Box<dyn Learner> = match attr_type {
                AttrType::Enum { .. } => {
                    Box::new(CategoricalLearner::new(schema, column, predictors)?)
                }
                AttrType::Integer | AttrType::Real => Box::new(LaplaceLearner::new(
                    schema,
                    column,
                    predictors,
                    column_config.tolerance,
                )?),
                AttrType::String => Box::new(StringLearner::new(column)),
            };
            learners.push(learner);
        }
        Ok(Self {
            learners,
            pass: 0,
        })
    }

    /// Completed passes.
    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Feed one tuple to every column learner.
    pub fn feed_tuple(&mut self, tuple: &[AttrValue]) -> Result<()> {
        for learner in &mut self.learners {
            learner.feed_tuple(tuple)?;
        }
        Ok(())
    }

    /// End the current pass.
    pub fn end_of_data(&mut self) {
        for learner in &mut self.learners {
            learner.end_of_data();
        }
        self.pass += 1;
        debug!(
            pass = self.pass,
            more = self.require_more_iterations(),
            full = self.require_full_pass(),
            "training pass finished"
        );
    }

    /// Whether any column needs another pass.
    pub fn require_more_iterations(&self) -> bool {
        self.learners.iter().any(|l| l.require_more_iterations())
    }

    /// Whether any column needs the next pass to be complete.
    pub fn require_full_pass(&self) -> bool {
        self.learners.iter().any(|l| l.require_full_pass())
    }

    /// Select a model for every column, in column order.
    pub fn finish(self) -> Result<Vec<Model>> {
        self.learners
            .into_iter()
            .enumerate()
            .map(|(column, learner)| select_cheapest(column, learner.finish()?))
            .collect()
    }
}

/// Columns ordered so that every predictor precedes its dependents, lowest
/// index first among the columns that are ready.
///
/// `predictors[c]` lists the predictors of column `c`.
pub fn attribute_order(predictors: &[Vec<usize>]) -> Result<Vec<usize>> {
    let n = predictors.len();
    let mut pending = vec![0usize; n];
    let mut dependents = vec![Vec::new(); n];
    for (column, preds) in predictors.iter().enumerate() {
        for &p in preds {
            if p >= n {
                return Err(Error::Config(format!(
                    "column {column} is predicted by missing column {p}"
                )));
            }
            pending[column] += 1;
            dependents[p].push(column);
        }
    }
    let mut ready: BTreeSet<usize> = (0..n).filter(|&c| pending[c] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(column) = ready.pop_first() {
        order.push(column);
        for &d in &dependents[column] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }
    if let Some(column) = (0..n).find(|&c| pending[c] > 0) {
        return Err(Error::CyclicPredictors(column));
    }
    Ok(order)
}

/// Whether `order` is a permutation in which every column follows all of
/// its predictors.
pub fn is_valid_order(order: &[usize], predictors: &[Vec<usize>]) -> bool {
    let n = predictors.len();
    if order.len() != n {
        return false;
    }
    let mut position = vec![usize::MAX; n];
    for (i, &column) in order.iter().enumerate() {
        if column >= n || position[column] != usize::MAX {
            return false;
        }
        position[column] = i;
    }
    predictors.iter().enumerate().all(|(column, preds)| {
        preds
            .iter()
            .all(|&p| p < n && position[p] < position[column])
    })
}
