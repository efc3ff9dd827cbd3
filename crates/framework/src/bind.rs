use tracing::debug;
use vfi_api::{AsyncHandle, Closure, Disposition, Result, Session};
use vfi_command::{get_location, get_str_arg, parse_ternary_op};

/// `bind_create://x.xl/d.dl?event_name(dn)=s.sl?event_name(sn)`
///
/// Once the bind succeeds, the source and destination events that carry an
/// `event_name` are registered at the location of their descriptor.
///
/// # Errors
///
/// Returns a parse error when the command is not a ternary operation or a
/// named event has no location.
pub fn bind_create(session: &Session, handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
    let op = parse_ternary_op(command)?;

    let mut events = Vec::new();
    for descriptor in [&op.src, &op.dest] {
        if let Ok(Some(name)) = get_str_arg(descriptor, "event_name") {
            events.push((name, get_location(descriptor)?));
        }
    }

    if !events.is_empty() {
        debug!(?events, "bind names events");
        session
            .handles()
            .set_closure(handle, Some(Closure::BindCreate { events }))?;
    }

    Ok(Disposition::Forward)
}
