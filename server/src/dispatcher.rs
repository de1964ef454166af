//! Protocol dispatcher: one inbound message per call.

use crate::handler::SessionHandler;
use crate::registry::SessionRegistry;
use crate::timeout::notify_departure;
use crate::transport::Transport;
use log::{debug, info, warn};
use shared::MsgType;

/// Receives and applies a single inbound message.
///
/// Returns the type of the processed message, or `None` when the transport
/// had nothing pending (or failed), which ends the drain loop for this tick.
pub fn dispatch_one<T, H>(
    transport: &mut T,
    registry: &mut SessionRegistry,
    handler: &mut H,
) -> Option<MsgType>
where
    T: Transport + ?Sized,
    H: SessionHandler + ?Sized,
{
    let (message, sender) = match transport.receive() {
        Ok(Some(received)) => received,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to receive message: {}", e);
            return None;
        }
    };

    match message.kind {
        MsgType::Empty => return None,

        MsgType::Connect => {
            info!("Client {} connecting...", sender);
            if !registry.insert(sender) {
                debug!("Client {} sent Connect while already connected", sender);
            }
            handler.on_connect(sender);
        }

        MsgType::ClientUpdate => handler.on_client_update(sender, &message.payload),

        MsgType::Disconnect => {
            info!("Client {} disconnected", sender);
            registry.remove(sender);
            transport.remove_connection(sender);
            notify_departure(transport, registry, sender);
            handler.on_disconnect(sender);
        }

        MsgType::Custom(kind) => handler.on_custom_message(kind, &message.payload, sender),
    }

    Some(message.kind)
}
