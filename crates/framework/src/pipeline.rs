//! The `pipe://` compiler.
//!
//! ```text
//! pipe://[<inmap<]*func[(event[,event]*)][>omap]*
//! ```
//!
//! The payload is cut into elements at `< > ( ) ,`. The element before `(`
//! is the function, the elements up to `)` form the event chain from head to
//! tail, anything before the function is an input map and anything after
//! the chain is an output map. Without a `(` the first element ended by `>`
//! or by the end of the text stands in for the function.
//!
//! Compiling resolves every name, links consecutive events on the driver
//! with `event_chain` commands and rewrites the command into the
//! `event_start` of the chain head. The compiled [`Pipeline`] is attached to
//! the correlator and runs once the start succeeds.

use tracing::{debug, warn};
use vfi_api::{AsyncHandle, Closure, Disposition, Error, Pipeline, Result, Session};
use vfi_command::payload;

const DELIMITERS: &[char] = &['<', '>', '(', ')', ','];

/// The names a `pipe://` command refers to.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PipeSpec {
    /// Input maps in order.
    pub inputs: Vec<String>,
    /// The function.
    pub function: String,
    /// Events from head to tail.
    pub events: Vec<String>,
    /// Output maps in order.
    pub outputs: Vec<String>,
}

/// Splits a `pipe://` payload into its parts.
///
/// Malformed but resolvable text is accepted; a description without events
/// parses fine and is only rejected when compiled.
///
/// # Errors
///
/// Returns [`vfi_command::Error::Malformed`] when there is no element at
/// all.
pub fn parse_pipe(text: &str) -> Result<PipeSpec> {
    let elements = split(payload(text));

    let mut function = None;
    let mut events_end = 0;
    let mut outputs_end = 0;

    for (index, (_, terminator)) in elements.iter().enumerate() {
        match terminator {
            Some('<' | ',') => {}
            Some('(') => function = Some(index),
            Some(')') => events_end = index,
            _ => {
                function.get_or_insert(index);
                outputs_end = index;
            }
        }
    }

    let Some(function) = function else {
        return Err(vfi_command::Error::Malformed(format!("no function in `{text}`")).into());
    };

    let events_end = events_end.max(function);
    let outputs_end = outputs_end.max(events_end);

    let names = |range: std::ops::RangeInclusive<usize>| -> Vec<String> {
        elements
            .get(range)
            .unwrap_or_default()
            .iter()
            .map(|(name, _)| (*name).to_string())
            .collect()
    };

    Ok(PipeSpec {
        inputs: elements[..function]
            .iter()
            .map(|(name, _)| (*name).to_string())
            .collect(),
        function: elements[function].0.to_string(),
        events: if events_end > function {
            names(function + 1..=events_end)
        } else {
            Vec::new()
        },
        outputs: if outputs_end > events_end {
            names(events_end + 1..=outputs_end)
        } else {
            Vec::new()
        },
    })
}

/// The `pipe` pre-command.
///
/// Every name is resolved before the driver is contacted, so an unknown
/// function, map or event leaves `command` untouched. Chain links already
/// issued are not torn down when a later link fails.
///
/// # Errors
///
/// Returns [`Error::NoEvents`] for a pipeline without events,
/// [`Error::NotFound`] for unknown names, [`Error::CountMismatch`] when the
/// maps do not suit the function, and the request error of a failed chain
/// link.
pub fn pipe(session: &Session, handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
    let spec = parse_pipe(command)?;
    if spec.events.is_empty() {
        return Err(Error::NoEvents);
    }

    let function = session.find_function(&spec.function)?;
    function.check_arity(spec.inputs.len(), spec.outputs.len())?;

    let inputs = spec
        .inputs
        .iter()
        .map(|name| session.find_map(name))
        .collect::<Result<Vec<_>>>()?;
    let outputs = spec
        .outputs
        .iter()
        .map(|name| session.find_map(name))
        .collect::<Result<Vec<_>>>()?;
    let locations = spec
        .events
        .iter()
        .map(|name| session.find_event(name))
        .collect::<Result<Vec<_>>>()?;

    let pipeline = Pipeline::new(function, inputs, outputs, spec.events.clone())?;

    for (link, pair) in spec.events.windows(2).enumerate() {
        let chain = format!(
            "event_chain://{}.{}?event_name({})",
            pair[0], locations[link], pair[1]
        );

        if let Err(e) = session.request(handle, &chain) {
            warn!(%chain, links_issued = link, error = %e, "event chain failed");
            return Err(e);
        }
        debug!(%chain, "chained");
    }

    session
        .handles()
        .set_closure(handle, Some(Closure::Pipeline(pipeline)))?;
    *command = format!("event_start://{}.{}", spec.events[0], locations[0]);

    debug!(function = %spec.function, %command, "compiled pipeline");
    Ok(Disposition::Forward)
}

fn split(text: &str) -> Vec<(&str, Option<char>)> {
    let mut elements = Vec::new();
    let mut rest = text;

    while let Some(first) = rest.chars().next() {
        if DELIMITERS.contains(&first) {
            rest = &rest[first.len_utf8()..];
            continue;
        }

        let end = rest.find(DELIMITERS).unwrap_or(rest.len());
        let element = rest[..end].trim();
        rest = &rest[end..];

        if !element.is_empty() {
            elements.push((element, rest.chars().next()));
        }
    }

    elements
}
