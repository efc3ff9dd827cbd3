//! Compiled pipelines: a function, its maps and the events that trigger it.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::function::Function;
use crate::map::Map;

/// A function bound to input and output maps, triggered by a chain of
/// events.
#[derive(Clone, Debug)]
pub struct Pipeline {
    function: Function,
    inputs: Vec<Arc<Map>>,
    outputs: Vec<Arc<Map>>,
    events: Vec<String>,
    flags: u32,
}

impl Pipeline {
    /// Builds a pipeline, validating the map counts against the function.
    ///
    /// `events` are event names from head to tail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEvents`] for an empty chain and
    /// [`Error::CountMismatch`] when the maps do not suit the function.
    pub fn new(
        function: Function,
        inputs: Vec<Arc<Map>>,
        outputs: Vec<Arc<Map>>,
        events: Vec<String>,
    ) -> Result<Self> {
        if events.is_empty() {
            return Err(Error::NoEvents);
        }
        function.check_arity(inputs.len(), outputs.len())?;

        let flags = pack_flags(function.name(), inputs.len(), outputs.len());
        Ok(Self {
            function,
            inputs,
            outputs,
            events,
            flags,
        })
    }

    /// The function run by the pipeline.
    #[must_use]
    pub const fn function(&self) -> &Function {
        &self.function
    }

    /// Input maps in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[Arc<Map>] {
        &self.inputs
    }

    /// Output maps in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[Arc<Map>] {
        &self.outputs
    }

    /// Event names from head to tail.
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// The event that starts the chain.
    #[must_use]
    pub fn head(&self) -> &str {
        &self.events[0]
    }

    /// The packed count word: input count in the low byte, output count in
    /// the next, XOR the CRC32 of the function name.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Runs the function over the maps after re-checking the count word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptPipeline`] when the count word no longer
    /// matches, otherwise whatever the function returns.
    pub fn execute(&self) -> Result<()> {
        let expected = pack_flags(self.function.name(), self.inputs.len(), self.outputs.len());
        if expected != self.flags {
            return Err(Error::CorruptPipeline(self.function.name().to_string()));
        }

        debug!(
            function = self.function.name(),
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "running pipeline"
        );
        self.function.call(&self.inputs, &self.outputs)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn pack_flags(function: &str, inputs: usize, outputs: usize) -> u32 {
    let counts = (inputs as u32 & 0xff) | ((outputs as u32 & 0xff) << 8);
    counts ^ crc32fast::hash(function.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    fn maps(names: &[&str]) -> Vec<Arc<Map>> {
        names.iter().map(|name| Arc::new(Map::new(*name, 16))).collect()
    }

    #[test]
    fn test_flags_pack_counts() {
        let function = Function::new("scale", Some(2), Some(1), |_, _| Ok(()));
        let pipeline = Pipeline::new(
            function,
            maps(&["a", "b"]),
            maps(&["c"]),
            vec!["done".to_string()],
        )
        .unwrap();

        assert_eq!(pipeline.flags() ^ crc32fast::hash(b"scale"), 0x0102);
        assert_eq!(pipeline.head(), "done");
    }

    #[test]
    fn test_rejects_empty_chain_and_bad_counts() {
        let function = Function::new("scale", Some(1), Some(1), |_, _| Ok(()));

        assert_matches!(
            Pipeline::new(function.clone(), maps(&["a"]), maps(&["b"]), Vec::new()),
            Err(Error::NoEvents)
        );
        assert_matches!(
            Pipeline::new(function, maps(&["a"]), Vec::new(), vec!["e".to_string()]),
            Err(Error::CountMismatch { actual_outputs: 0, .. })
        );
    }

    #[test]
    fn test_execute_calls_function_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let function = Function::new("count", None, None, move |inputs, outputs| {
            assert_eq!(inputs.len() + outputs.len(), 3);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let pipeline = Pipeline::new(
            function,
            maps(&["a", "b"]),
            maps(&["c"]),
            vec!["x".to_string(), "y".to_string()],
        )
        .unwrap();
        pipeline.execute().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_detects_corruption() {
        let function = Function::new("scale", None, None, |_, _| Ok(()));
        let mut pipeline =
            Pipeline::new(function, maps(&["a"]), maps(&["b"]), vec!["e".to_string()]).unwrap();

        pipeline.flags ^= 1;

        assert_matches!(pipeline.execute(), Err(Error::CorruptPipeline(name)) if name == "scale");
    }
}
