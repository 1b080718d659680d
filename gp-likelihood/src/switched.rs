//! Heterogeneous likelihoods selected per row.
//!
//! The last column of `Y` holds, for every row, the index of the child
//! likelihood that explains it. Rows are gathered per child, evaluated,
//! and stitched back in their original order.

use candle_core::{bail, DType, Device, Result, Tensor};
use log::debug;

use crate::param::Parameter;
use crate::settings::Integration;
use crate::traits::Likelihood;

/// Row groups of a batch, one per child likelihood.
#[derive(Debug, Clone)]
pub struct Partition {
    groups: Vec<Vec<u32>>,
    index_tensors: Vec<Option<Tensor>>,
    inverse: Tensor,
    num_rows: usize,
}

impl Partition {
    /// Group rows `0..labels.len()` by their label.
    pub fn from_labels(labels: &[usize], num_groups: usize, device: &Device) -> Result<Self> {
        if labels.is_empty() {
            bail!("Partition: empty batch");
        }
        let mut groups = vec![Vec::new(); num_groups];
        for (row, &label) in labels.iter().enumerate() {
            if label >= num_groups {
                bail!("Partition: index {} out of range 0..{}", label, num_groups);
            }
            groups[label].push(row as u32);
        }

        let index_tensors = groups
            .iter()
            .map(|rows| {
                if rows.is_empty() {
                    Ok(None)
                } else {
                    Tensor::from_slice(rows, rows.len(), device).map(Some)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        // position of every original row in the concatenation of groups
        let mut inverse = vec![0u32; labels.len()];
        let mut pos = 0u32;
        for rows in groups.iter() {
            for &row in rows {
                inverse[row as usize] = pos;
                pos += 1;
            }
        }

        Ok(Self {
            groups,
            index_tensors,
            inverse: Tensor::from_vec(inverse, labels.len(), device)?,
            num_rows: labels.len(),
        })
    }

    /// Partition on the last column of `y`, which must hold integers in
    /// `0..num_groups`.
    pub fn from_index_column(y: &Tensor, num_groups: usize) -> Result<Self> {
        let (n, d) = y.dims2()?;
        if d == 0 {
            bail!("Partition: Y has no index column");
        }
        if n == 0 {
            bail!("Partition: empty batch");
        }
        let column = y
            .narrow(1, d - 1, 1)?
            .flatten_all()?
            .to_dtype(DType::F64)?
            .to_vec1::<f64>()?;
        let labels = column
            .iter()
            .map(|&v| {
                if v.fract() != 0.0 || v < 0.0 {
                    bail!("Partition: index {} is not a non-negative integer", v);
                }
                Ok(v as usize)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_labels(&labels, num_groups, y.device())
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(|g| g.len()).collect()
    }

    /// Rows of `x` belonging to each group, `None` for empty groups
    pub fn gather(&self, x: &Tensor) -> Result<Vec<Option<Tensor>>> {
        if x.dim(0)? != self.num_rows {
            bail!(
                "Partition: tensor has {} rows, partition {}",
                x.dim(0)?,
                self.num_rows
            );
        }
        self.index_tensors
            .iter()
            .map(|idx| idx.as_ref().map(|idx| x.index_select(idx, 0)).transpose())
            .collect()
    }

    /// Inverse of [`Partition::gather`]: interleave per-group results back
    /// into the original row order.
    pub fn stitch(&self, parts: &[Option<Tensor>]) -> Result<Tensor> {
        if parts.len() != self.groups.len() {
            bail!(
                "Partition: {} parts for {} groups",
                parts.len(),
                self.groups.len()
            );
        }
        let mut present = Vec::with_capacity(parts.len());
        for (rows, part) in self.groups.iter().zip(parts.iter()) {
            match part {
                Some(t) if t.dim(0)? == rows.len() => present.push(t),
                Some(t) => bail!(
                    "Partition: part has {} rows, group {}",
                    t.dim(0)?,
                    rows.len()
                ),
                None if rows.is_empty() => {}
                None => bail!("Partition: missing part for a group of {} rows", rows.len()),
            }
        }
        Tensor::cat(&present, 0)?.index_select(&self.inverse, 0)
    }
}

/// Routes every row to one of several child likelihoods.
///
/// `Y` carries one extra trailing column with the child index; it is
/// stripped before the children see the data. Latent inputs are not
/// augmented.
pub struct SwitchedLikelihood {
    likelihood_list: Vec<Box<dyn Likelihood>>,
}

impl SwitchedLikelihood {
    pub fn new(likelihood_list: Vec<Box<dyn Likelihood>>) -> Result<Self> {
        if likelihood_list.is_empty() {
            bail!("SwitchedLikelihood needs at least one likelihood");
        }
        Ok(Self { likelihood_list })
    }

    pub fn num_likelihoods(&self) -> usize {
        self.likelihood_list.len()
    }

    pub fn likelihoods(&self) -> &[Box<dyn Likelihood>] {
        &self.likelihood_list
    }

    /// Split `args` and `y` by the index column, apply `op` per child and
    /// stitch the results.
    fn partition_and_stitch<F>(
        &self,
        name: &str,
        args: &[&Tensor],
        y: &Tensor,
        op: F,
    ) -> Result<Tensor>
    where
        F: Fn(&dyn Likelihood, &[Tensor], &Tensor) -> Result<Tensor>,
    {
        let (n, d) = y.dims2()?;
        if d == 0 {
            bail!("SwitchedLikelihood::{}: Y has no index column", name);
        }

        // nothing to route: any child produces the empty result
        if n == 0 {
            let Some(first) = self.likelihood_list.first() else {
                bail!("SwitchedLikelihood::{}: no likelihoods", name);
            };
            let y_data = Tensor::zeros((0, d - 1), y.dtype(), y.device())?;
            let args = args.iter().map(|a| (*a).clone()).collect::<Vec<_>>();
            return op(first.as_ref(), &args, &y_data);
        }

        let partition = Partition::from_index_column(y, self.likelihood_list.len())?;
        debug!(
            "SwitchedLikelihood::{}: rows per likelihood {:?}",
            name,
            partition.group_sizes()
        );

        let y_data = y.narrow(1, 0, d - 1)?;
        let y_parts = partition.gather(&y_data)?;
        let arg_parts = args
            .iter()
            .map(|a| partition.gather(a))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(self.likelihood_list.len());
        for (i, lik) in self.likelihood_list.iter().enumerate() {
            let result = match &y_parts[i] {
                Some(y_i) => {
                    let args_i = arg_parts
                        .iter()
                        .map(|parts| parts[i].clone())
                        .collect::<Option<Vec<_>>>();
                    match args_i {
                        Some(args_i) => Some(op(lik.as_ref(), &args_i, y_i)?),
                        None => bail!(
                            "SwitchedLikelihood::{}: missing inputs for likelihood {}",
                            name,
                            i
                        ),
                    }
                }
                None => None,
            };
            results.push(result);
        }
        partition.stitch(&results)
    }

    /// Apply `op` to every child on the full batch and concatenate the
    /// results along columns.
    fn concat_children<F>(&self, op: F) -> Result<Tensor>
    where
        F: Fn(&dyn Likelihood) -> Result<Tensor>,
    {
        let outs = self
            .likelihood_list
            .iter()
            .map(|lik| op(lik.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Tensor::cat(&outs, 1)
    }
}

impl Likelihood for SwitchedLikelihood {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        self.partition_and_stitch("logp", &[f], y, |lik, a, y| lik.logp(&a[0], y))
    }

    /// Every child's conditional mean, concatenated along columns
    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        self.concat_children(|lik| lik.conditional_mean(f))
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        self.concat_children(|lik| lik.conditional_variance(f))
    }

    /// Children carry their own integration settings.
    fn integration(&self) -> Integration {
        Integration::default()
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.likelihood_list
            .iter()
            .flat_map(|lik| lik.parameters())
            .collect()
    }

    fn variational_expectations(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        self.partition_and_stitch("variational_expectations", &[fmu, fvar], y, |lik, a, y| {
            lik.variational_expectations(&a[0], &a[1], y)
        })
    }

    fn predict_density(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        self.partition_and_stitch("predict_density", &[fmu, fvar], y, |lik, a, y| {
            lik.predict_density(&a[0], &a[1], y)
        })
    }

    /// Predictions of every child on the full batch, concatenated along
    /// columns
    fn predict_mean_and_var(&self, fmu: &Tensor, fvar: &Tensor) -> Result<(Tensor, Tensor)> {
        let (means, vars): (Vec<_>, Vec<_>) = self
            .likelihood_list
            .iter()
            .map(|lik| lik.predict_mean_and_var(fmu, fvar))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        Ok((Tensor::cat(&means, 1)?, Tensor::cat(&vars, 1)?))
    }
}
