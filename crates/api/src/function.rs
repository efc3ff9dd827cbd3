//! Registered functions that pipelines run over their maps.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::map::Map;

/// Signature of a pipeline function body: input maps, then output maps.
pub type Body = dyn Fn(&[Arc<Map>], &[Arc<Map>]) -> Result<()> + Send + Sync;

/// A named function with the number of maps it expects on each side.
///
/// `None` for a count means any number is accepted.
#[derive(Clone)]
pub struct Function {
    name: String,
    inputs: Option<usize>,
    outputs: Option<usize>,
    body: Arc<Body>,
}

impl Function {
    /// Creates a function.
    pub fn new<F>(
        name: impl Into<String>,
        inputs: Option<usize>,
        outputs: Option<usize>,
        body: F,
    ) -> Self
    where
        F: Fn(&[Arc<Map>], &[Arc<Map>]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inputs,
            outputs,
            body: Arc::new(body),
        }
    }

    /// The function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected number of input maps.
    #[must_use]
    pub const fn inputs(&self) -> Option<usize> {
        self.inputs
    }

    /// Expected number of output maps.
    #[must_use]
    pub const fn outputs(&self) -> Option<usize> {
        self.outputs
    }

    /// Checks supplied map counts against the expected ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CountMismatch`] when either count is pinned and
    /// differs.
    pub fn check_arity(&self, inputs: usize, outputs: usize) -> Result<()> {
        let matches = |expected: Option<usize>, actual| expected.is_none_or(|n| n == actual);

        if matches(self.inputs, inputs) && matches(self.outputs, outputs) {
            return Ok(());
        }

        Err(Error::CountMismatch {
            function: self.name.clone(),
            expected_inputs: self.inputs,
            actual_inputs: inputs,
            expected_outputs: self.outputs,
            actual_outputs: outputs,
        })
    }

    /// Runs the body.
    ///
    /// # Errors
    ///
    /// Returns whatever the body returns.
    pub fn call(&self, inputs: &[Arc<Map>], outputs: &[Arc<Map>]) -> Result<()> {
        (self.body)(inputs, outputs)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}
