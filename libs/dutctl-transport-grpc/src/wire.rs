//! Conversions between the core's transport-agnostic message types
//! ([`dutctl_core::session::broker`]) and the generated protobuf types.

use dutctl_core::session::broker::{CommandEnvelope, InboundMessage, OutboundMessage};

use crate::pb;

pub(crate) fn outbound_to_wire(msg: OutboundMessage) -> pb::ServerMessage {
    use pb::server_message::Kind;
    let kind = match msg {
        OutboundMessage::Print(text) => Kind::Print(text),
        OutboundMessage::Stdout(data) => Kind::Stdout(pb::ConsoleChunk { data }),
        OutboundMessage::Stderr(data) => Kind::Stderr(pb::ConsoleChunk { data }),
        OutboundMessage::FileRequest { name } => Kind::FileRequest(pb::FileRequest { path: name }),
        OutboundMessage::File { name, size, data } => Kind::File(pb::FileChunk { path: name, size, data }),
    };
    pb::ServerMessage { kind: Some(kind) }
}

/// Converts one wire message into a core `InboundMessage`. Returns `None`
/// for a message with no `kind` set (a malformed/partial protobuf), which
/// the caller should treat as "no message yet" and keep reading rather than
/// surface to the broker.
pub(crate) fn wire_to_inbound(msg: pb::ClientMessage) -> Option<InboundMessage> {
    use pb::client_message::Kind;
    match msg.kind? {
        Kind::Command(pb::CommandEnvelope { device, command, args }) => {
            Some(InboundMessage::Command(CommandEnvelope { device, command, args }))
        }
        Kind::Stdin(pb::ConsoleChunk { data }) => Some(InboundMessage::Stdin(data)),
        Kind::File(pb::FileChunk { path, size, data }) => Some(InboundMessage::File { name: path, size, data }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_print_round_trips_through_the_wire_shape() {
        let wire = outbound_to_wire(OutboundMessage::Print("hello".into()));
        assert!(matches!(wire.kind, Some(pb::server_message::Kind::Print(text)) if text == "hello"));
    }

    #[test]
    fn outbound_file_carries_name_size_and_bytes() {
        let wire = outbound_to_wire(OutboundMessage::File { name: "a.bin".into(), size: 3, data: vec![1, 2, 3] });
        match wire.kind {
            Some(pb::server_message::Kind::File(chunk)) => {
                assert_eq!(chunk.path, "a.bin");
                assert_eq!(chunk.size, 3);
                assert_eq!(chunk.data, vec![1, 2, 3]);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn inbound_command_round_trips() {
        let wire = pb::ClientMessage {
            kind: Some(pb::client_message::Kind::Command(pb::CommandEnvelope {
                device: "devA".into(),
                command: "cmdX".into(),
                args: vec!["a".into()],
            })),
        };
        match wire_to_inbound(wire) {
            Some(InboundMessage::Command(env)) => {
                assert_eq!(env.device, "devA");
                assert_eq!(env.command, "cmdX");
                assert_eq!(env.args, vec!["a"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inbound_with_no_kind_set_is_none() {
        let wire = pb::ClientMessage { kind: None };
        assert!(wire_to_inbound(wire).is_none());
    }
}
