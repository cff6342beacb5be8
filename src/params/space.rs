//! The parameter space of a template and its cartesian expansion.

use super::{Combination, ParamType, Parameter};
use crate::error::{FanoutError, Result};
use crate::template;

/// Upper bound on the capacity reserved up front when expanding combinations.
const MAX_PREALLOCATED_COMBINATIONS: usize = 1 << 16;

/// All parameters declared for a template, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter, or returns the existing one with that name.
    ///
    /// An existing parameter keeps its type; `param_type` only applies to new ones.
    pub fn add_parameter(&mut self, name: &str, param_type: ParamType) -> &mut Parameter {
        let index = match self.position(name) {
            Some(index) => index,
            None => {
                self.parameters.push(Parameter::new(name, param_type));
                self.parameters.len() - 1
            }
        };
        &mut self.parameters[index]
    }

    /// Declares a text parameter for every placeholder in `sql` not yet declared.
    ///
    /// Returns the names that were newly added.
    pub fn declare_from_template(&mut self, sql: &str) -> Vec<String> {
        let mut added = Vec::new();
        for name in template::extract_parameters(sql) {
            if self.position(&name).is_none() {
                self.add_parameter(&name, ParamType::Text);
                added.push(name);
            }
        }
        added
    }

    /// Removes a parameter. Combinations generated earlier are unaffected.
    pub fn remove_parameter(&mut self, name: &str) -> Option<Parameter> {
        self.position(name).map(|index| self.parameters.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name() == name)
    }

    /// All declared parameters in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
    }

    /// Number of combinations `generate_combinations` would return.
    ///
    /// Parameters without values are ignored. Saturates at `usize::MAX`.
    pub fn combination_count(&self) -> usize {
        self.active()
            .fold(1usize, |count, p| count.saturating_mul(p.values.len()))
    }

    /// Expands the cartesian product of all non-empty value sets.
    ///
    /// The earliest-declared parameter varies slowest. With no parameters, or
    /// none holding values, the result is a single empty combination.
    pub fn generate_combinations(&self) -> Vec<Combination> {
        let active: Vec<&Parameter> = self.active().collect();
        if active.is_empty() {
            return vec![Combination::empty()];
        }

        let total = self.combination_count();
        let mut combinations = Vec::with_capacity(total.min(MAX_PREALLOCATED_COMBINATIONS));
        let mut indices = vec![0usize; active.len()];

        loop {
            combinations.push(Combination::new(
                active
                    .iter()
                    .zip(&indices)
                    .map(|(p, &i)| (p.name().to_string(), p.values[i].clone()))
                    .collect(),
            ));

            // Odometer step: bump the last position, carrying leftwards.
            let mut pos = active.len();
            loop {
                if pos == 0 {
                    return combinations;
                }
                pos -= 1;
                indices[pos] += 1;
                if indices[pos] < active[pos].values.len() {
                    break;
                }
                indices[pos] = 0;
            }
        }
    }

    /// Like `generate_combinations`, but refuses to expand more than `max`.
    ///
    /// The count is checked first, so an oversized product is never built.
    pub fn generate_combinations_within(&self, max: Option<usize>) -> Result<Vec<Combination>> {
        let count = self.combination_count();
        match max {
            Some(max) if count > max => Err(FanoutError::parameter(format!(
                "{} combinations exceed the limit of {max}",
                if count == usize::MAX {
                    "Too many".to_string()
                } else {
                    count.to_string()
                }
            ))),
            _ => Ok(self.generate_combinations()),
        }
    }

    fn active(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| !p.values.is_empty())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name() == name)
    }
}
