use tracing::debug;
use vfi_api::{AsyncHandle, Disposition, Result, Session};
use vfi_command::{get_extent, get_hex_arg, get_offset, parse_desc};

/// `map_init://name#off:ext?init_val(hex)`
///
/// Fills bytes `[off, off + ext)` of the registered map `name` with the
/// 32-bit `init_val`, in native byte order. The driver is not contacted.
///
/// # Errors
///
/// Returns parse errors for a missing name, offset, extent or value,
/// [`vfi_api::Error::NotFound`] for an unknown map and
/// [`vfi_api::Error::OutOfRange`] when the range does not fit.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn map_init(session: &Session, _handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
    let name = parse_desc(command)?.name;
    let offset = get_offset(command)?;
    let extent = get_extent(command)?;
    let value = get_hex_arg(command, "init_val")? as u32;

    let map = session.find_map(&name)?;
    map.fill(offset, extent, value)?;

    debug!(map = %name, offset, extent, value, "initialised map");
    Ok(Disposition::Handled)
}
