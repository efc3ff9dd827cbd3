use vfi_api::{AsyncHandle, Closure, Disposition, Result, Session};
use vfi_command::get_option;

/// `event_find://name.location`: registers the event the driver reports.
///
/// # Errors
///
/// Returns [`vfi_api::Error::InvalidHandle`] if the correlator is gone.
pub fn event_find(session: &Session, handle: AsyncHandle, _command: &mut String) -> Result<Disposition> {
    session.handles().set_closure(handle, Some(Closure::EventFind))?;
    Ok(Disposition::Forward)
}

/// `sync_find://name.location?wait`: with `wait`, repeats the command until
/// the driver reports success.
///
/// # Errors
///
/// Returns [`vfi_api::Error::InvalidHandle`] if the correlator is gone.
pub fn sync_find(session: &Session, handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
    await_result(session, handle, command)
}

/// `location_find://name.location?wait`: with `wait`, repeats the command
/// until the driver reports success.
///
/// # Errors
///
/// Returns [`vfi_api::Error::InvalidHandle`] if the correlator is gone.
pub fn location_find(session: &Session, handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
    await_result(session, handle, command)
}

fn await_result(session: &Session, handle: AsyncHandle, command: &str) -> Result<Disposition> {
    if get_option(command, "wait") {
        session.handles().set_closure(handle, Some(Closure::AwaitResult))?;
    }
    Ok(Disposition::Forward)
}
