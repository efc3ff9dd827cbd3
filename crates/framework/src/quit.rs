use tracing::info;
use vfi_api::{AsyncHandle, Disposition, Result, Session};

/// `quit://`: marks the session done without contacting the driver.
///
/// # Errors
///
/// Never fails.
pub fn quit(session: &Session, _handle: AsyncHandle, _command: &mut String) -> Result<Disposition> {
    info!("quit requested");
    session.set_done();
    Ok(Disposition::Handled)
}
