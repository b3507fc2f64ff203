//! Message dispatch.
//!
//! Every decoded logical message is routed by its [`MessageKind`]. Built-in
//! subtypes are handled here; application-defined (`Custom`) subtypes go to
//! the hook registered for their class.
//!
//! The dispatcher never transmits. It returns the [`Action`]s the node must
//! perform, in order, so that a reboot happens only after its confirmation
//! has been sent.
//!
//! # Outcome Replies
//!
//! `Success`, `Fail` and `Confirm` acknowledgements carry
//! `{"subtype": <command code>, "error": <string or null>}`.

use crate::auth::AuthorizationContext;
use crate::config::Identity;
use crate::message::{Ack, Command, Info, Message, MessageKind, Outgoing};
use crate::payload::Payload;
use crate::peer::{PeerMetadata, PeerRegistry};
use crate::platform::{Platform, PlatformError, WifiCredentials};
use crate::queue::{InboundQueue, QueuedMessage};
use crate::transport::SignalTable;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error text for admin commands from unauthorized senders.
pub const NOT_AUTHORIZED: &str = "not authorized";

/// Error text for command subtypes nobody handles.
pub const UNKNOWN_COMMAND: &str = "unknown command";

/// Application handler for one message class.
pub type Hook = Box<dyn FnMut(&Message) -> Option<Outgoing> + Send>;

/// Payload of `Success`, `Fail` and `Confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Code of the command this answers.
    pub subtype: u8,
    pub error: Option<String>,
}

impl Outcome {
    pub fn success(command: Command) -> Self {
        Self {
            subtype: command.code(),
            error: None,
        }
    }

    pub fn failure(command: Command, error: impl Into<String>) -> Self {
        Self {
            subtype: command.code(),
            error: Some(error.into()),
        }
    }

    pub fn to_payload(&self) -> Payload {
        serde_json::to_value(self)
            .map(Payload::Structured)
            .unwrap_or(Payload::None)
    }

    pub fn from_payload(payload: &Payload) -> Option<Self> {
        serde_json::from_value(payload.as_structured()?.clone()).ok()
    }
}

/// Payload of a `Pong`: the responder's metadata and the ping's timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongPayload {
    #[serde(flatten)]
    pub metadata: PeerMetadata,
    /// Sender timestamp of the ping being answered.
    pub timestamp: u32,
}

/// Work the node performs after dispatching a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(Outgoing),
    /// Restart via the platform, after every earlier action.
    Reboot,
}

/// Node state a handler may read or change.
pub struct DispatchContext<'a> {
    pub identity: &'a mut Identity,
    pub channel: u8,
    pub interface: u8,
    pub registry: &'a mut PeerRegistry,
    pub queue: &'a mut InboundQueue,
    pub platform: &'a mut dyn Platform,
    pub paused: &'a mut bool,
    /// Transport's live signal table, for proximity snapshots.
    pub signal: &'a SignalTable,
}

/// Routes messages to built-in handlers and application hooks.
#[derive(Default)]
pub struct Dispatcher {
    on_command: Option<Hook>,
    on_info: Option<Hook>,
    on_ack: Option<Hook>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("on_command", &self.on_command.is_some())
            .field("on_info", &self.on_info.is_some())
            .field("on_ack", &self.on_ack.is_some())
            .finish()
    }
}

fn reply(message: &Message, kind: MessageKind, payload: impl Into<Payload>) -> Action {
    Action::Send(Outgoing::new(message.source, kind, payload))
}

fn outcome(message: &Message, ack: Ack, outcome: Outcome) -> Action {
    reply(message, MessageKind::Ack(ack), outcome.to_payload())
}

fn report(message: &Message, command: Command, result: Result<(), PlatformError>) -> Action {
    match result {
        Ok(()) => outcome(message, Ack::Success, Outcome::success(command)),
        Err(e) => {
            warn!("{:?} from {} failed: {}", command, message.source, e);
            outcome(message, Ack::Fail, Outcome::failure(command, e.to_string()))
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for `Custom` command subtypes. Custom commands are not
    /// administrative, so the hook sees the payload exactly as sent.
    pub fn set_command_hook(&mut self, hook: Hook) {
        self.on_command = Some(hook);
    }

    /// Handler for `Custom` info subtypes.
    pub fn set_info_hook(&mut self, hook: Hook) {
        self.on_info = Some(hook);
    }

    /// Handler for `Custom` ack subtypes.
    pub fn set_ack_hook(&mut self, hook: Hook) {
        self.on_ack = Some(hook);
    }

    /// Handle one message and return what the node must do next.
    pub fn dispatch(&mut self, ctx: &mut DispatchContext<'_>, message: Message) -> Vec<Action> {
        debug!("{} from {} ({:?})", message.kind, message.source, message.payload);
        match message.kind {
            MessageKind::Command(command) => self.command(ctx, command, message),
            MessageKind::Info(kind) => self.info(ctx, kind, message),
            MessageKind::Ack(kind) => self.ack(ctx, kind, message),
        }
    }

    fn command(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        command: Command,
        mut message: Message,
    ) -> Vec<Action> {
        if command.is_admin() {
            let auth = AuthorizationContext::evaluate(
                &message.source,
                &ctx.identity.trusted,
                std::mem::replace(&mut message.payload, Payload::None),
            );
            if !auth.is_authorized() {
                warn!("Refused {:?} from untrusted {}", command, message.source);
                return vec![outcome(
                    &message,
                    Ack::Fail,
                    Outcome::failure(command, NOT_AUTHORIZED),
                )];
            }
            message.payload = auth.into_payload();
        }

        match command {
            Command::Ping => vec![handle_ping(ctx, &message)],
            Command::Echo => vec![reply(
                &message,
                MessageKind::Ack(Ack::EchoReply),
                message.payload.clone(),
            )],
            Command::Boop => {
                let table = ctx.registry.snapshot(ctx.signal);
                let value = serde_json::to_value(&table).unwrap_or_default();
                vec![reply(
                    &message,
                    MessageKind::Info(Info::ProximityTable),
                    Payload::Structured(value),
                )]
            }
            Command::Reboot => {
                info!("Reboot requested by {}", message.source);
                vec![
                    outcome(&message, Ack::Confirm, Outcome::success(command)),
                    Action::Reboot,
                ]
            }
            Command::RunFile => {
                let result = match message.payload.as_str() {
                    Some(path) if !path.is_empty() => {
                        info!("Running {} for {}", path, message.source);
                        ctx.platform.run_file(path)
                    }
                    _ => Err(PlatformError::InvalidArgument("expected a file path".into())),
                };
                vec![report(&message, command, result)]
            }
            Command::ResendChunks => {
                info!(
                    "Resend of lost chunks requested by {}; not supported",
                    message.source
                );
                Vec::new()
            }
            Command::WifiConnect => {
                let result = WifiCredentials::from_payload(&message.payload)
                    .map_err(PlatformError::from)
                    .and_then(|creds| ctx.platform.wifi_connect(&creds));
                vec![report(&message, command, result)]
            }
            Command::WifiDisconnect => {
                let result = ctx.platform.wifi_disconnect();
                vec![report(&message, command, result)]
            }
            Command::AccessPointEnable => {
                let result = if message.payload.is_none() {
                    ctx.platform.access_point_enable(None)
                } else {
                    WifiCredentials::from_payload(&message.payload)
                        .map_err(PlatformError::from)
                        .and_then(|creds| ctx.platform.access_point_enable(Some(&creds)))
                };
                vec![report(&message, command, result)]
            }
            Command::AccessPointDisable => {
                let result = ctx.platform.access_point_disable();
                vec![report(&message, command, result)]
            }
            Command::Pause | Command::Resume => {
                *ctx.paused = command == Command::Pause;
                info!("{:?} by {}", command, message.source);
                vec![outcome(&message, Ack::Success, Outcome::success(command))]
            }
            Command::SetConfig
            | Command::SetName
            | Command::SetAdmin
            | Command::TrustAppend => {
                let result = update_identity(ctx.identity, command, &message.payload);
                if result.is_ok() {
                    info!("{:?} applied for {}", command, message.source);
                    ctx.platform.identity_changed(ctx.identity);
                }
                vec![report(&message, command, result)]
            }
            Command::Custom(code) => match self.on_command.as_mut() {
                Some(hook) => hook(&message).map(Action::Send).into_iter().collect(),
                None => {
                    debug!("Unknown command 0x{:02X} from {}", code, message.source);
                    vec![outcome(
                        &message,
                        Ack::Fail,
                        Outcome::failure(command, UNKNOWN_COMMAND),
                    )]
                }
            },
        }
    }

    fn info(&mut self, ctx: &mut DispatchContext<'_>, kind: Info, message: Message) -> Vec<Action> {
        match kind {
            Info::SensorData => {
                ctx.registry.record_sensor_data(message.source, message.payload);
            }
            Info::ProximityTable => match message.payload {
                Payload::Structured(table) => ctx.registry.record_proximity(message.source, table),
                other => debug!("Ignoring proximity table {:?} from {}", other, message.source),
            },
            Info::Message => {
                ctx.queue.push(QueuedMessage::new(
                    message.source,
                    message.payload,
                    message.received_at,
                ));
            }
            Info::Custom(_) => return self.hook(HookClass::Info, &message),
        }
        Vec::new()
    }

    fn ack(&mut self, ctx: &mut DispatchContext<'_>, kind: Ack, message: Message) -> Vec<Action> {
        match kind {
            Ack::Pong => handle_pong(ctx, &message),
            Ack::EchoReply => info!("Echo reply from {}: {:?}", message.source, message.payload),
            Ack::Success | Ack::Confirm => match Outcome::from_payload(&message.payload) {
                Some(result) => info!(
                    "{:?} for {:?} from {}",
                    kind,
                    Command::from_code(result.subtype),
                    message.source
                ),
                None => info!("{:?} from {}", kind, message.source),
            },
            Ack::Fail => match Outcome::from_payload(&message.payload) {
                Some(result) => warn!(
                    "{:?} failed on {}: {}",
                    Command::from_code(result.subtype),
                    message.source,
                    result.error.as_deref().unwrap_or("no reason given")
                ),
                None => warn!("Failure reported by {}", message.source),
            },
            Ack::Custom(_) => return self.hook(HookClass::Ack, &message),
        }
        Vec::new()
    }

    fn hook(&mut self, class: HookClass, message: &Message) -> Vec<Action> {
        let hook = match class {
            HookClass::Info => self.on_info.as_mut(),
            HookClass::Ack => self.on_ack.as_mut(),
        };
        match hook {
            Some(hook) => hook(message).map(Action::Send).into_iter().collect(),
            None => {
                debug!("Ignoring {} from {}", message.kind, message.source);
                Vec::new()
            }
        }
    }
}

#[derive(Clone, Copy)]
enum HookClass {
    Info,
    Ack,
}

fn metadata_from(payload: &Payload) -> Option<PeerMetadata> {
    serde_json::from_value(payload.as_structured()?.clone()).ok()
}

fn handle_ping(ctx: &mut DispatchContext<'_>, message: &Message) -> Action {
    let metadata = metadata_from(&message.payload);
    ctx.registry
        .add_or_update(message.source, metadata.as_ref(), None, None);

    let pong = PongPayload {
        metadata: ctx.identity.metadata(ctx.channel, ctx.interface),
        timestamp: message.sent_at,
    };
    let payload = serde_json::to_value(&pong)
        .map(Payload::Structured)
        .unwrap_or(Payload::None);
    reply(message, MessageKind::Ack(Ack::Pong), payload)
}

fn handle_pong(ctx: &mut DispatchContext<'_>, message: &Message) {
    let Some(pong) = message
        .payload
        .as_structured()
        .and_then(|v| serde_json::from_value::<PongPayload>(v.clone()).ok())
    else {
        debug!("Malformed pong from {}", message.source);
        return;
    };
    let rtt = message.received_at.wrapping_sub(pong.timestamp);
    ctx.registry
        .record_pong(message.source, &pong.metadata, rtt, message.received_at);
    info!("Pong from {} in {} ms", message.source, rtt);
}

fn update_identity(
    identity: &mut Identity,
    command: Command,
    payload: &Payload,
) -> Result<(), PlatformError> {
    let invalid = |msg: &str| PlatformError::InvalidArgument(msg.to_string());
    match (command, payload) {
        (Command::SetConfig, Payload::Structured(value)) => {
            identity.config = Some(value.clone());
        }
        (Command::SetConfig, Payload::Str(text)) => {
            let value: Value =
                serde_json::from_str(text).map_err(|_| invalid("config is not JSON"))?;
            identity.config = Some(value);
        }
        (Command::SetConfig, _) => return Err(invalid("expected a JSON config")),
        (Command::SetName, Payload::Str(name)) if !name.is_empty() => {
            identity.name = name.clone();
        }
        (Command::SetName, _) => return Err(invalid("expected a name")),
        (Command::SetAdmin, Payload::Bool(admin)) => identity.admin = *admin,
        (Command::SetAdmin, Payload::Int(flag)) => identity.admin = *flag != 0,
        (Command::SetAdmin, _) => return Err(invalid("expected a boolean")),
        (Command::TrustAppend, Payload::Str(text)) => {
            let address = text.parse().map_err(|_| invalid("expected a peer address"))?;
            identity.trust(address);
        }
        (Command::TrustAppend, Payload::Raw(bytes)) => {
            let bytes: [u8; 6] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| invalid("expected a 6-byte address"))?;
            identity.trust(bytes.into());
        }
        (Command::TrustAppend, _) => return Err(invalid("expected a peer address")),
        _ => return Err(invalid("not an identity command")),
    }
    Ok(())
}
