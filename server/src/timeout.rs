//! Eviction of peers the transport reports as silent.

use crate::handler::SessionHandler;
use crate::registry::SessionRegistry;
use crate::transport::Outbound;
use log::{info, warn};
use shared::{ClientId, Message};

/// Reliably tells every registered client that `departed` has left.
///
/// `departed` must already be out of the registry so it is not notified.
pub fn notify_departure<O>(out: &mut O, registry: &SessionRegistry, departed: ClientId)
where
    O: Outbound + ?Sized,
{
    let notice = Message::disconnect(departed);
    registry.for_each(|client| {
        if let Err(e) = out.send_reliable(&notice, client) {
            warn!(
                "Failed to notify client {} that client {} left: {}",
                client, departed, e
            );
        }
    });
}

/// Timeout callback body: evicts `id` and tells the survivors.
///
/// Safe to call for an id that is no longer registered. Always reports
/// success back to the transport.
pub fn handle_timeout<O, H>(
    out: &mut O,
    registry: &mut SessionRegistry,
    handler: &mut H,
    id: ClientId,
) -> bool
where
    O: Outbound + ?Sized,
    H: SessionHandler + ?Sized,
{
    registry.remove(id);
    notify_departure(out, registry, id);

    info!("Client {} disconnected due to timeout", id);
    handler.on_disconnect(id);

    true
}
