use tracing::debug;
use vfi_api::{AsyncHandle, Closure, Disposition, Result, Session};
use vfi_command::{get_extent, get_str_arg};

/// `smb_create://smb.loc#off:ext?map_name(name)`
///
/// With a `map_name`, the created buffer is mapped and registered under
/// that name through a follow-up `smb_mmap`.
///
/// # Errors
///
/// Returns [`vfi_api::Error::InvalidHandle`] if the correlator is gone.
pub fn smb_create(session: &Session, handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
    if let Ok(Some(map_name)) = get_str_arg(command, "map_name") {
        debug!(%map_name, "mapping buffer once created");
        session
            .handles()
            .set_closure(handle, Some(Closure::SmbCreate { map_name }))?;
    }

    Ok(Disposition::Forward)
}

/// `smb_mmap://smb.loc#off:ext?map_name(name)`
///
/// With a `map_name`, the buffer is mapped at the offset the driver returns
/// and registered under that name.
///
/// # Errors
///
/// Returns a parse error when a named mapping has no extent.
pub fn smb_mmap(session: &Session, handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
    if let Ok(Some(map_name)) = get_str_arg(command, "map_name") {
        let extent = get_extent(command)?;
        debug!(%map_name, extent, "mapping buffer");
        session
            .handles()
            .set_closure(handle, Some(Closure::MmapCreate { map_name, extent }))?;
    }

    Ok(Disposition::Forward)
}
