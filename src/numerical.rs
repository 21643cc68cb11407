//! Error-bounded numeric models.
//!
//! Values are snapped to a grid of bins whose width is derived from the
//! column's tolerance, so reconstructing a value as the center of its bin
//! never errs by more than the tolerance. Bin offsets from a per-cell
//! center follow a discretized Laplace distribution:
//!
//! ```text
//! P(bin 0)        = 1 - exp(-w / 2s)
//! P(bin k), k > 0 = (1 - P(bin 0)) / 2 * (1 - exp(-w / s)) * exp(-(k - 1) w / s)
//! ```
//!
//! The first decision picks below / center / above. Each side is then
//! searched outward in steps of `ceil(s / w)` bins, doubling the step after
//! every move, and the bracketed range is bisected using the conditional
//! distribution. Since the exponential tail is memoryless, every outward
//! decision has the same shape regardless of how far out it happens.

use std::cmp::Ordering;
use std::f64::consts::LOG2_E;
use std::io::Read;

use tracing::debug;

use crate::attr::{AttrType, AttrValue, Row, Schema};
use crate::data_io::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::interval::{Prob, PROB_ONE};
use crate::learner::{Candidate, Learner};
use crate::model::{CellIndex, Model};
use crate::squid::Squid;

/// Largest bin offset, in either direction, that can be coded. Every
/// integer lies within `2^64` bins of any integer center.
pub const MAX_OFFSET: i128 = 1 << 65;

const MAX_STEP: i128 = 1 << 62;

/// Largest integer tolerance honored; larger ones are clamped.
const MAX_INTEGER_TOLERANCE: f64 = (1u64 << 60) as f64;

/// Relative margin by which real bins are narrowed.
const REAL_SHAVE: f64 = 1e-6;

/// Values per cell used to estimate the center.
const MEDIAN_SAMPLE: usize = 1024;

/// Scale candidates are `2^(k/2)` times the deviation estimate.
const SCALE_STEPS: std::ops::RangeInclusive<i32> = -4..=4;

const MIN_RAW: u32 = 1;
const MAX_RAW: u32 = PROB_ONE - 1;

/// Bin width shared by every cell of a model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Width {
    /// Odd integer width `2 * floor(tolerance) + 1`.
    Integer(i64),
    /// Real width just below `2 * tolerance`.
    Real(f32),
}

impl Width {
    /// Widest bins honoring `tolerance` for a column of `attr_type`.
    pub fn for_tolerance(attr_type: AttrType, tolerance: f64) -> Result<Self> {
        match attr_type {
            AttrType::Integer => {
                let half = tolerance.floor().clamp(0.0, MAX_INTEGER_TOLERANCE) as i64;
                Ok(Width::Integer(2 * half + 1))
            }
            AttrType::Real => {
                let target = 2.0 * tolerance * (1.0 - REAL_SHAVE);
                let mut width = target as f32;
                if width as f64 > target {
                    width = f32::from_bits(width.to_bits() - 1);
                }
                if !(width > 0.0 && width.is_finite()) {
                    return Err(Error::Config(format!(
                        "real tolerance {tolerance} is out of the representable range"
                    )));
                }
                Ok(Width::Real(width))
            }
            other => Err(Error::Config(format!("no numeric model for {other} columns"))),
        }
    }

    /// Width as a float.
    pub fn as_f64(self) -> f64 {
        match self {
            Width::Integer(w) => w as f64,
            Width::Real(w) => w as f64,
        }
    }
}

/// Value at the center of bin zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Center {
    /// Integer center.
    Integer(i64),
    /// Real center.
    Real(f64),
}

/// Parameters of one predictor cell. A zero scale marks a cell whose
/// values all fall into the center bin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaplaceCell {
    /// Center of bin zero.
    pub center: Center,
    /// Laplace scale in value units.
    pub scale: f32,
}

#[derive(Clone, Copy, Debug)]
struct Grid {
    width: Width,
    center: Center,
}

impl Grid {
    /// Bin holding `value`.
    fn bin_of(&self, value: &AttrValue, column: usize) -> Result<i128> {
        let bin: i128 = match (self.width, self.center, value) {
            (Width::Integer(w), Center::Integer(c), AttrValue::Integer(v)) => {
                let twice = 2 * (*v as i128 - c as i128);
                let w = w as i128;
                (twice + w).div_euclid(2 * w)
            }
            (Width::Real(w), Center::Real(c), AttrValue::Real(v)) => {
                let x = ((v - c) / w as f64).round();
                if x.is_finite() && x.abs() < MAX_OFFSET as f64 {
                    x as i128
                } else {
                    i128::MAX
                }
            }
            (Width::Integer(_), ..) => {
                return Err(Error::TypeMismatch {
                    column,
                    expected: "integer",
                })
            }
            _ => {
                return Err(Error::TypeMismatch {
                    column,
                    expected: "real",
                })
            }
        };
        if bin.abs() >= MAX_OFFSET - 1 {
            return Err(Error::Unencodable {
                column,
                reason: "real value is too far from the center of its cell".into(),
            });
        }
        if let (Width::Real(w), AttrValue::Real(v)) = (self.width, value) {
            let back = self.value_at(bin)?.as_real().unwrap_or(f64::NAN);
            if !((back - v).abs() <= w as f64 * 0.5 * (1.0 + REAL_SHAVE)) {
                return Err(Error::Unencodable {
                    column,
                    reason: format!("{v} cannot be reconstructed within tolerance"),
                });
            }
        }
        Ok(bin)
    }

    /// Center value of `bin`. Integer centers past the `i64` range saturate,
    /// which only moves them closer to any value the bin holds.
    fn value_at(&self, bin: i128) -> Result<AttrValue> {
        match (self.width, self.center) {
            (Width::Integer(w), Center::Integer(c)) => {
                let value = bin
                    .saturating_mul(w as i128)
                    .saturating_add(c as i128)
                    .clamp(i64::MIN as i128, i64::MAX as i128);
                Ok(AttrValue::Integer(value as i64))
            }
            (Width::Real(w), Center::Real(c)) => {
                let value = c + bin as f64 * w as f64;
                if value.is_finite() {
                    Ok(AttrValue::Real(value))
                } else {
                    Err(Error::Corrupt("decoded real overflows".into()))
                }
            }
            _ => Err(Error::Corrupt("center does not match the bin width".into())),
        }
    }

    /// Offset of `value` from the center in value units.
    fn offset(&self, value: &AttrValue) -> f64 {
        match (self.center, value) {
            (Center::Integer(c), AttrValue::Integer(v)) => (*v as i128 - c as i128) as f64,
            (Center::Real(c), AttrValue::Real(v)) => v - c,
            _ => 0.0,
        }
    }
}

/// Laplace model over the cells of a predictor table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableLaplace {
    target: usize,
    cells: CellIndex,
    width: Width,
    params: Vec<LaplaceCell>,
}

impl TableLaplace {
    /// Column the model encodes.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Predictor columns.
    pub fn predictors(&self) -> &[usize] {
        self.cells.predictors()
    }

    /// Whether the model codes integers.
    pub fn is_integer(&self) -> bool {
        matches!(self.width, Width::Integer(_))
    }

    /// Bin width.
    pub fn width(&self) -> Width {
        self.width
    }

    /// Per-cell parameters.
    pub fn params(&self) -> &[LaplaceCell] {
        &self.params
    }

    /// Decision cursor for the cell selected by `row`.
    pub fn squid<R: Row + ?Sized>(&self, row: &R) -> Result<LaplaceSquid<'_>> {
        let cell = self.cells.locate(row)?;
        Ok(LaplaceSquid {
            column: self.target,
            width: self.width,
            cell: &self.params[cell],
            low: None,
            high: None,
            mid: 0,
            step: 1,
            boundaries: [Prob::ZERO; 2],
            count: 0,
        })
    }

    /// Serialized size in bits, tag excluded.
    pub fn description_bits(&self) -> usize {
        let width_bits = match self.width {
            Width::Integer(_) => 64,
            Width::Real(_) => 32,
        };
        self.cells.description_bits() + width_bits + self.params.len() * (64 + 32)
    }

    /// Serialize into `block`.
    pub fn write(&self, out: &mut ByteWriter, block: usize) {
        self.cells.write(out, block);
        match self.width {
            Width::Integer(w) => out.write_u64(w as u64, block),
            Width::Real(w) => out.write_u32(w.to_bits(), block),
        }
        for cell in &self.params {
            match cell.center {
                Center::Integer(c) => out.write_u64(c as u64, block),
                Center::Real(c) => out.write_u64(c.to_bits(), block),
            }
            out.write_u32(cell.scale.to_bits(), block);
        }
    }

    /// Read the model of numeric column `column`.
    pub fn read<R: Read>(
        reader: &mut ByteReader<R>,
        schema: &Schema,
        column: usize,
        integer: bool,
    ) -> Result<Self> {
        let cells = CellIndex::read(reader, schema)?;
        let width = if integer {
            let w = reader.read_u64()? as i64;
            if w < 1 {
                return Err(Error::Corrupt(format!("integer bin width {w}")));
            }
            Width::Integer(w)
        } else {
            let w = f32::from_bits(reader.read_u32()?);
            if !(w > 0.0 && w.is_finite()) {
                return Err(Error::Corrupt(format!("real bin width {w}")));
            }
            Width::Real(w)
        };
        let mut params = Vec::with_capacity(cells.cells());
        for _ in 0..cells.cells() {
            let raw = reader.read_u64()?;
            let center = if integer {
                Center::Integer(raw as i64)
            } else {
                let c = f64::from_bits(raw);
                if !c.is_finite() {
                    return Err(Error::Corrupt(format!("cell center {c}")));
                }
                Center::Real(c)
            };
            let scale = f32::from_bits(reader.read_u32()?);
            if !(scale >= 0.0 && scale.is_finite()) {
                return Err(Error::Corrupt(format!("cell scale {scale}")));
            }
            params.push(LaplaceCell { center, scale });
        }
        Ok(Self {
            target: column,
            cells,
            width,
            params,
        })
    }
}

fn prob(p: f64) -> Prob {
    Prob::from_f64_clamped(p, MIN_RAW, MAX_RAW)
}

/// Cursor narrowing a range of bins until a single bin remains.
///
/// `low`/`high` are the inclusive bin bounds known so far; `None` means the
/// side is unbounded, both `None` means no decision has been taken yet.
#[derive(Debug)]
pub struct LaplaceSquid<'a> {
    column: usize,
    width: Width,
    cell: &'a LaplaceCell,
    low: Option<i128>,
    high: Option<i128>,
    mid: i128,
    step: i128,
    boundaries: [Prob; 2],
    count: usize,
}

impl LaplaceSquid<'_> {
    fn grid(&self) -> Grid {
        Grid {
            width: self.width,
            center: self.cell.center,
        }
    }

    /// Probability mass of the `bins` bins nearest the center on one side,
    /// relative to that side.
    fn cdf(&self, bins: i128) -> f64 {
        let rate = self.width.as_f64() / self.cell.scale as f64;
        -(-(bins as f64) * rate).exp_m1()
    }

    fn first_step(&self) -> i128 {
        let step = (self.cell.scale as f64 / self.width.as_f64()).ceil();
        (step as i128).clamp(1, MAX_STEP)
    }

    fn set_boundary(&mut self, p: f64) {
        self.boundaries[0] = prob(p);
        self.count = 1;
    }

    /// Close the upper side once the next step would pass the last bin.
    fn bound_upper(&mut self) {
        if let Some(low) = self.low {
            if low + self.step - 1 >= MAX_OFFSET {
                self.high = Some(MAX_OFFSET.max(low));
            }
        }
    }

    /// Close the lower side once the next step would pass the last bin.
    fn bound_lower(&mut self) {
        if let Some(high) = self.high {
            if high - self.step < -MAX_OFFSET {
                self.low = Some((-MAX_OFFSET).min(high));
            }
        }
    }
}

impl Squid for LaplaceSquid<'_> {
    fn is_end(&self) -> bool {
        matches!((self.low, self.high), (Some(l), Some(h)) if l == h)
    }

    fn generate_next_branch(&mut self) {
        match (self.low, self.high) {
            (None, None) if self.cell.scale == 0.0 => self.count = 0,
            (None, None) => {
                let rate = self.width.as_f64() / self.cell.scale as f64;
                let center = -(-rate / 2.0).exp_m1();
                let half = Prob::from_f64_clamped(center / 2.0, MIN_RAW, PROB_ONE / 2 - 1).raw();
                self.boundaries = [
                    Prob::from_raw(PROB_ONE / 2 - half),
                    Prob::from_raw(PROB_ONE / 2 + half),
                ];
                self.count = 2;
            }
            (Some(low), None) => {
                self.mid = low + self.step - 1;
                self.set_boundary(self.cdf(self.step));
            }
            (None, Some(high)) => {
                self.mid = high - self.step;
                self.set_boundary(1.0 - self.cdf(self.step));
            }
            (Some(low), Some(high)) => {
                let n = high - low + 1;
                let half = n / 2;
                let total = self.cdf(n);
                let near = if total > 0.0 {
                    self.cdf(half) / total
                } else {
                    half as f64 / n as f64
                };
                if high < 0 {
                    self.mid = high - half;
                    self.set_boundary(1.0 - near);
                } else {
                    self.mid = low + half - 1;
                    self.set_boundary(near);
                }
            }
        }
    }

    fn branches(&self) -> &[Prob] {
        &self.boundaries[..self.count]
    }

    fn get_next_branch(&self, value: &AttrValue) -> Result<usize> {
        let bin = self.grid().bin_of(value, self.column)?;
        match (self.low, self.high) {
            (None, None) if self.cell.scale == 0.0 => {
                if bin == 0 {
                    Ok(0)
                } else {
                    Err(Error::Unencodable {
                        column: self.column,
                        reason: "value differs from the constant learned for its cell".into(),
                    })
                }
            }
            (None, None) => Ok(match bin.cmp(&0) {
                Ordering::Less => 0,
                Ordering::Equal => 1,
                Ordering::Greater => 2,
            }),
            _ => Ok(usize::from(bin > self.mid)),
        }
    }

    fn choose_next_branch(&mut self, branch: usize) -> Result<()> {
        match (self.low, self.high) {
            (None, None) if self.cell.scale == 0.0 => {
                self.low = Some(0);
                self.high = Some(0);
            }
            (None, None) => match branch {
                0 => {
                    self.high = Some(-1);
                    self.step = self.first_step();
                    self.bound_lower();
                }
                1 => {
                    self.low = Some(0);
                    self.high = Some(0);
                }
                _ => {
                    self.low = Some(1);
                    self.step = self.first_step();
                    self.bound_upper();
                }
            },
            (Some(_), None) => {
                if branch == 0 {
                    self.high = Some(self.mid);
                } else {
                    self.low = Some(self.mid + 1);
                    self.step = (self.step * 2).min(MAX_STEP);
                    self.bound_upper();
                }
            }
            (None, Some(_)) => {
                if branch == 0 {
                    self.high = Some(self.mid);
                    self.step = (self.step * 2).min(MAX_STEP);
                    self.bound_lower();
                } else {
                    self.low = Some(self.mid + 1);
                }
            }
            (Some(_), Some(_)) => {
                if branch == 0 {
                    self.high = Some(self.mid);
                } else {
                    self.low = Some(self.mid + 1);
                }
            }
        }
        Ok(())
    }

    fn result(&self) -> Result<AttrValue> {
        match (self.low, self.high) {
            (Some(bin), Some(high)) if bin == high => self.grid().value_at(bin),
            _ => Err(Error::Stage("numeric value is not yet determined")),
        }
    }
}

/// Estimated bits to code `bin` with bins of `width` and Laplace `scale`.
fn bin_cost(bin: i128, width: f64, scale: f64) -> f64 {
    let rate = width / scale;
    let floor = 1.0 / PROB_ONE as f64;
    let center = (-(-rate / 2.0).exp_m1()).clamp(2.0 * floor, 1.0 - 2.0 * floor);
    if bin == 0 {
        return -center.log2();
    }
    let side = (1.0 - center) / 2.0;
    let first = (-(-rate).exp_m1()).max(floor);
    let k = bin.unsigned_abs() as f64;
    -side.log2() - first.log2() + (k - 1.0) * rate * LOG2_E
}

#[derive(Debug, Default)]
struct CellStats {
    sample: Vec<AttrValue>,
    center: Option<Center>,
    count: u64,
    abs_dev: f64,
    scales: Vec<f32>,
    costs: Vec<f64>,
    spread: bool,
}

impl CellStats {
    fn settle(&mut self, width: Width) {
        let center = match width {
            Width::Integer(_) => {
                let mut values: Vec<i64> =
                    self.sample.iter().filter_map(AttrValue::as_integer).collect();
                values.sort_unstable();
                Center::Integer(values.get(values.len() / 2).copied().unwrap_or(0))
            }
            Width::Real(_) => {
                let mut values: Vec<f64> = self.sample.iter().filter_map(AttrValue::as_real).collect();
                values.sort_by(f64::total_cmp);
                Center::Real(values.get(values.len() / 2).copied().unwrap_or(0.0))
            }
        };
        self.center = Some(center);
        let grid = Grid { width, center };
        for value in std::mem::take(&mut self.sample) {
            self.count += 1;
            self.abs_dev += grid.offset(&value).abs();
        }
    }
}

/// Two-pass learner: center and spread first, then the scale.
#[derive(Debug)]
pub struct LaplaceLearner {
    target: usize,
    cells: CellIndex,
    width: Width,
    stats: Vec<CellStats>,
    pass: u32,
}

impl LaplaceLearner {
    /// Learner for numeric column `target` with `tolerance`.
    pub fn new(
        schema: &Schema,
        target: usize,
        predictors: Vec<usize>,
        tolerance: f64,
    ) -> Result<Self> {
        let attr_type = schema
            .attr_type(target)
            .ok_or_else(|| Error::Config(format!("column {target} is out of range")))?;
        let width = Width::for_tolerance(attr_type, tolerance)?;
        let cells = CellIndex::new(schema, predictors)?;
        let mut stats = Vec::with_capacity(cells.cells());
        stats.resize_with(cells.cells(), CellStats::default);
        Ok(Self {
            target,
            cells,
            width,
            stats,
            pass: 0,
        })
    }

    fn default_center(&self) -> Center {
        match self.width {
            Width::Integer(_) => Center::Integer(0),
            Width::Real(_) => Center::Real(0.0),
        }
    }
}

impl Learner for LaplaceLearner {
    fn feed_tuple(&mut self, tuple: &[AttrValue]) -> Result<()> {
        let cell = self.cells.locate(tuple)?;
        let value = tuple.get(self.target).ok_or(Error::TupleShape {
            expected: self.target + 1,
            found: tuple.len(),
        })?;
        let width = self.width;
        let stats = &mut self.stats[cell];
        match (self.pass, stats.center) {
            (0, None) => {
                stats.sample.push(value.clone());
                if stats.sample.len() >= MEDIAN_SAMPLE {
                    stats.settle(width);
                }
            }
            (0, Some(center)) => {
                stats.count += 1;
                stats.abs_dev += Grid { width, center }.offset(value).abs();
            }
            (1, Some(center)) => {
                let bin = Grid { width, center }.bin_of(value, self.target)?;
                stats.spread |= bin != 0;
                for (cost, &scale) in stats.costs.iter_mut().zip(&stats.scales) {
                    *cost += bin_cost(bin, width.as_f64(), scale as f64);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn end_of_data(&mut self) {
        if self.pass == 0 {
            let width = self.width;
            for stats in &mut self.stats {
                if stats.center.is_none() {
                    stats.settle(width);
                }
                let mad = if stats.count > 0 {
                    stats.abs_dev / stats.count as f64
                } else {
                    0.0
                };
                let base = if mad > 0.0 { mad } else { width.as_f64() };
                stats.scales = SCALE_STEPS
                    .map(|k| {
                        let scale = base * 2f64.powf(k as f64 / 2.0);
                        (scale as f32).clamp(f32::MIN_POSITIVE, f32::MAX)
                    })
                    .collect();
                stats.costs = vec![0.0; stats.scales.len()];
            }
        }
        self.pass += 1;
    }

    fn require_more_iterations(&self) -> bool {
        self.pass < 2
    }

    fn require_full_pass(&self) -> bool {
        match self.pass {
            0 => !self.cells.predictors().is_empty(),
            1 => true,
            _ => false,
        }
    }

    fn finish(self: Box<Self>) -> Result<Vec<Candidate>> {
        let mut coding_bits = 0.0;
        let mut params = Vec::with_capacity(self.stats.len());
        for (cell, stats) in self.stats.iter().enumerate() {
            let center = stats.center.unwrap_or_else(|| self.default_center());
            let best = stats
                .costs
                .iter()
                .zip(&stats.scales)
                .min_by(|a, b| a.0.total_cmp(b.0));
            let scale = match best {
                Some((&cost, &scale)) if stats.spread => {
                    coding_bits += cost;
                    scale
                }
                _ => 0.0,
            };
            debug!(column = self.target, cell, ?center, scale, "laplace cell");
            params.push(LaplaceCell { center, scale });
        }
        let model = TableLaplace {
            target: self.target,
            cells: self.cells,
            width: self.width,
            params,
        };
        Ok(vec![Candidate::new(Model::Laplace(model), coding_bits)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::squid::trace_branches;
    use proptest::prelude::*;

    fn single_cell(width: Width, center: Center, scale: f32) -> TableLaplace {
        let schema = Schema::new(vec![AttrType::Integer]);
        TableLaplace {
            target: 0,
            cells: CellIndex::new(&schema, vec![]).unwrap(),
            width,
            params: vec![LaplaceCell { center, scale }],
        }
    }

    fn round_trip(model: &TableLaplace, value: AttrValue) -> (AttrValue, usize) {
        let row = [value.clone()];
        let mut squid = model.squid(&row[..]).unwrap();
        let trace = trace_branches(&mut squid, &value).unwrap();
        let mut replay = model.squid(&row[..]).unwrap();
        for &branch in &trace {
            assert!(!replay.is_end());
            replay.generate_next_branch();
            assert!(branch <= replay.branches().len());
            replay.choose_next_branch(branch).unwrap();
        }
        assert!(replay.is_end());
        (replay.result().unwrap(), trace.len())
    }

    #[test]
    fn test_widths() {
        assert_eq!(
            Width::for_tolerance(AttrType::Integer, 0.0).unwrap(),
            Width::Integer(1)
        );
        assert_eq!(
            Width::for_tolerance(AttrType::Integer, 2.7).unwrap(),
            Width::Integer(5)
        );
        let Width::Real(w) = Width::for_tolerance(AttrType::Real, 0.5).unwrap() else {
            panic!("expected a real width");
        };
        assert!((w as f64) < 1.0 && (w as f64) > 0.999);
        assert!(Width::for_tolerance(AttrType::Real, 0.0).is_err());
        assert!(Width::for_tolerance(AttrType::String, 1.0).is_err());
    }

    #[test]
    fn test_integer_values_are_exact() {
        let model = single_cell(Width::Integer(1), Center::Integer(100), 3.0);
        for v in (-1000..1000).step_by(7).chain([99, 100, 101]) {
            let (decoded, _) = round_trip(&model, AttrValue::Integer(v));
            assert_eq!(decoded, AttrValue::Integer(v));
        }
    }

    #[test]
    fn test_integer_tolerance() {
        let model = single_cell(Width::Integer(5), Center::Integer(-3), 10.0);
        for v in -200..200 {
            let (decoded, _) = round_trip(&model, AttrValue::Integer(v));
            let decoded = decoded.as_integer().unwrap();
            assert!((decoded - v).abs() <= 2, "{v} decoded as {decoded}");
        }
    }

    #[test]
    fn test_far_outliers_take_logarithmic_steps() {
        let model = single_cell(Width::Integer(1), Center::Integer(0), 1.0);
        for v in [1_000_000_000_000_000i64, -(1 << 61), i64::MAX / 3] {
            let (decoded, steps) = round_trip(&model, AttrValue::Integer(v));
            assert_eq!(decoded, AttrValue::Integer(v));
            assert!(steps < 200);
        }
    }

    #[test]
    fn test_integer_extremes_are_exact() {
        for center in [i64::MIN, -1, 0, i64::MAX] {
            let model = single_cell(Width::Integer(1), Center::Integer(center), 1.0);
            for v in [i64::MIN, i64::MIN + 1, -1, 0, i64::MAX - 1, i64::MAX] {
                let (decoded, steps) = round_trip(&model, AttrValue::Integer(v));
                assert_eq!(decoded, AttrValue::Integer(v));
                assert!(steps < 200);
            }
        }
    }

    #[test]
    fn test_integer_extremes_saturate_within_tolerance() {
        // Bins of width 5 around -1 put i64::MAX in a bin centered past it.
        let model = single_cell(Width::Integer(5), Center::Integer(-1), 1.0);
        let (decoded, _) = round_trip(&model, AttrValue::Integer(i64::MAX));
        let decoded = decoded.as_integer().unwrap();
        assert!(i64::MAX - decoded <= 2, "{decoded}");

        let model = single_cell(Width::Integer(5), Center::Integer(1), 1.0);
        let (decoded, _) = round_trip(&model, AttrValue::Integer(i64::MIN));
        let decoded = decoded.as_integer().unwrap();
        assert!(decoded as i128 - i64::MIN as i128 <= 2, "{decoded}");
    }

    #[test]
    fn test_out_of_range_real_offset_is_unencodable() {
        let model = single_cell(Width::Real(0.001), Center::Real(0.0), 1.0);
        let row = [AttrValue::Real(1e300)];
        let squid = model.squid(&row[..]).unwrap();
        assert!(matches!(
            squid.get_next_branch(&row[0]),
            Err(Error::Unencodable { column: 0, .. })
        ));
    }

    #[test]
    fn test_constant_cell_costs_nothing() {
        let model = single_cell(Width::Integer(3), Center::Integer(7), 0.0);
        let row = [AttrValue::Integer(8)];
        let mut squid = model.squid(&row[..]).unwrap();
        assert!(!squid.is_end());
        squid.generate_next_branch();
        assert!(squid.branches().is_empty());
        let (decoded, steps) = round_trip(&model, AttrValue::Integer(8));
        assert_eq!(decoded, AttrValue::Integer(7));
        assert_eq!(steps, 1);

        let row = [AttrValue::Integer(9)];
        let squid = model.squid(&row[..]).unwrap();
        assert!(squid.get_next_branch(&row[0]).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let model = single_cell(Width::Integer(1), Center::Integer(0), 1.0);
        let row = [AttrValue::Real(1.0)];
        let squid = model.squid(&row[..]).unwrap();
        assert!(matches!(
            squid.get_next_branch(&row[0]),
            Err(Error::TypeMismatch { .. })
        ));
    }

    fn learn(values: &[AttrValue], attr_type: AttrType, tolerance: f64) -> Candidate {
        let schema = Schema::new(vec![attr_type]);
        let mut learner = Box::new(LaplaceLearner::new(&schema, 0, vec![], tolerance).unwrap());
        assert!(!learner.require_full_pass());
        while learner.require_more_iterations() {
            for value in values {
                learner.feed_tuple(std::slice::from_ref(value)).unwrap();
            }
            learner.end_of_data();
        }
        let mut candidates = learner.finish().unwrap();
        assert_eq!(candidates.len(), 1);
        candidates.remove(0)
    }

    fn params(candidate: &Candidate) -> LaplaceCell {
        match &candidate.model {
            Model::Laplace(m) => m.params()[0],
            other => panic!("unexpected model {other:?}"),
        }
    }

    #[test]
    fn test_learner_finds_center_and_scale() {
        let values: Vec<AttrValue> = (0..500)
            .map(|i| AttrValue::Integer(1000 + (i % 21) - 10))
            .collect();
        let candidate = learn(&values, AttrType::Integer, 0.0);
        let cell = params(&candidate);
        assert_eq!(cell.center, Center::Integer(1000));
        assert!(cell.scale > 1.0 && cell.scale < 20.0);
        // Roughly log2(21) bits per value.
        let per_value = candidate.coding_bits / 500.0;
        assert!(per_value > 4.0 && per_value < 6.0, "{per_value}");
    }

    #[test]
    fn test_learner_detects_constant_cell() {
        let values: Vec<AttrValue> = [10.0, 10.2, 9.9, 10.05]
            .iter()
            .map(|&v| AttrValue::Real(v))
            .collect();
        let candidate = learn(&values, AttrType::Real, 0.5);
        let cell = params(&candidate);
        assert_eq!(cell.scale, 0.0);
        assert_eq!(candidate.coding_bits, 0.0);
    }

    #[test]
    fn test_description_round_trip() {
        let schema = Schema::new(vec![AttrType::Enum { cap: 2 }, AttrType::Real]);
        let model = TableLaplace {
            target: 1,
            cells: CellIndex::new(&schema, vec![0]).unwrap(),
            width: Width::Real(0.25),
            params: vec![
                LaplaceCell {
                    center: Center::Real(-1.5),
                    scale: 2.0,
                },
                LaplaceCell {
                    center: Center::Real(8.0),
                    scale: 0.0,
                },
            ],
        };
        let model = Model::Laplace(model);
        let mut out = ByteWriter::new(1);
        model.write(&mut out, 0);
        assert_eq!(out.total_bits(), model.description_bits());
        let mut bytes = Vec::new();
        out.finish(&mut bytes).unwrap();
        let mut reader = ByteReader::new(&bytes[..]);
        assert_eq!(Model::read(&mut reader, &schema, 1).unwrap(), model);
    }

    proptest! {
        #[test]
        fn prop_real_values_within_tolerance(
            center in -1e6f64..1e6,
            scale in 0.01f32..1000.0,
            tolerance in 0.001f64..10.0,
            values in prop::collection::vec(-1e6f64..1e6, 1..30),
        ) {
            let width = Width::for_tolerance(AttrType::Real, tolerance).unwrap();
            let model = single_cell(width, Center::Real(center), scale);
            for v in values {
                let (decoded, _) = round_trip(&model, AttrValue::Real(v));
                let decoded = decoded.as_real().unwrap();
                prop_assert!((decoded - v).abs() <= tolerance, "{} decoded as {}", v, decoded);
            }
        }

        #[test]
        fn prop_integer_values_within_tolerance(
            center in any::<i64>(),
            scale in 0.5f32..1e6,
            tolerance in 0u32..50,
            values in prop::collection::vec(any::<i64>(), 1..30),
        ) {
            let width = Width::for_tolerance(AttrType::Integer, tolerance as f64).unwrap();
            let model = single_cell(width, Center::Integer(center), scale);
            for v in values {
                let (decoded, _) = round_trip(&model, AttrValue::Integer(v));
                let decoded = decoded.as_integer().unwrap();
                prop_assert!((decoded as i128 - v as i128).abs() <= tolerance as i128);
            }
        }
    }
}
