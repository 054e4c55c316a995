//! ST[19] event-action: bind on-board events to ST[08] function calls.
//!
//! Definitions live in a bounded table keyed by event definition id with
//! multi-map semantics: several actions may be bound to the same event, and
//! all enabled ones run when the event fires. A global function status gates
//! the whole mechanism.
use heapless::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::message::Message;
use crate::services::{create_tm, store_tm, verification, ServiceContext};
use crate::{ECSS_EVENT_ACTION_MAP_SIZE, ECSS_FUNCTION_MAX_ARG_LENGTH};

pub const SERVICE_TYPE: u8 = 19;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    AddEventAction = 1,
    DeleteEventAction = 3,
    DeleteAllEventAction = 4,
    EnableEventAction = 5,
    DisableEventAction = 6,
    ReportStatusOfEachEventAction = 7,
    EnableEventActionFunction = 8,
    DisableEventActionFunction = 9,
}

/// TM[19,8] event-action status report. Shares its number with the
/// enable-function telecommand; the packet type disambiguates.
pub const EVENT_ACTION_STATUS_REPORT: u8 = 8;

#[derive(Debug, Clone)]
pub struct EventActionDefinition {
    pub application_id: u16,
    pub event_definition_id: u16,
    pub action_id: u16,
    pub action_args: [u8; ECSS_FUNCTION_MAX_ARG_LENGTH],
    pub enabled: bool,
}

pub struct EventActionService {
    definitions: Vec<EventActionDefinition, ECSS_EVENT_ACTION_MAP_SIZE>,
    event_action_function_status: bool,
}

impl Default for EventActionService {
    fn default() -> Self {
        EventActionService {
            definitions: Vec::new(),
            event_action_function_status: false,
        }
    }
}

impl EventActionService {
    pub fn function_status(&self) -> bool {
        self.event_action_function_status
    }

    pub fn definitions(&self) -> &[EventActionDefinition] {
        &self.definitions
    }

    /// The enabled (function id, args) bindings of one event, in table
    /// order. Empty when the global function status is off.
    pub fn enabled_actions(
        &self,
        event_id: u16,
    ) -> Vec<(u16, [u8; ECSS_FUNCTION_MAX_ARG_LENGTH]), ECSS_EVENT_ACTION_MAP_SIZE> {
        let mut actions = Vec::new();
        if !self.event_action_function_status {
            return actions;
        }
        for definition in self
            .definitions
            .iter()
            .filter(|d| d.event_definition_id == event_id && d.enabled)
        {
            // Capacity suffices: the source table has the same bound.
            let _ = actions.push((definition.action_id, definition.action_args));
        }
        actions
    }

    fn position_of(&self, event_id: u16) -> Option<usize> {
        self.definitions
            .iter()
            .position(|d| d.event_definition_id == event_id)
    }

    /// TC[19,1] add event-action definitions.
    fn add_definitions(&mut self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, MessageType::AddEventAction as u8) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let parsed = self.read_definition(request);
            let definition = match parsed {
                Ok(definition) => definition,
                Err(e) => {
                    // The stream is unparseable from here on.
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            match self.position_of(definition.event_definition_id) {
                Some(index) if self.definitions[index].enabled => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::EventActionEnabledError,
                    );
                    continue;
                }
                Some(index) => {
                    self.definitions.remove(index);
                }
                None => {}
            }
            if self.definitions.push(definition).is_err() {
                verification::fail_start(
                    ctx,
                    request,
                    SpacecraftError::EventActionDefinitionsMapIsFull,
                );
            }
        }
    }

    fn read_definition(
        &mut self,
        request: &mut Message,
    ) -> Result<EventActionDefinition, SpacecraftError> {
        let application_id = request.read_u16()?;
        let event_definition_id = request.read_u16()?;
        let action_id = request.read_u16()?;
        let args_length = request.read_u8()?;
        if usize::from(args_length) > ECSS_FUNCTION_MAX_ARG_LENGTH {
            return Err(SpacecraftError::MessageTooLarge);
        }
        let mut action_args = [0u8; ECSS_FUNCTION_MAX_ARG_LENGTH];
        request.read_bytes(&mut action_args[..usize::from(args_length)])?;
        Ok(EventActionDefinition {
            application_id,
            event_definition_id,
            action_id,
            action_args,
            enabled: false,
        })
    }

    /// TC[19,3] delete event-action definitions.
    fn delete_definitions(&mut self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, MessageType::DeleteEventAction as u8)
        {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let (application_id, event_id) =
                match request.read_u16().and_then(|a| Ok((a, request.read_u16()?))) {
                    Ok(pair) => pair,
                    Err(e) => {
                        verification::fail_acceptance(ctx, request, e);
                        return;
                    }
                };
            match self.position_of(event_id) {
                None => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::EventActionUnknownDefinitionError,
                    );
                }
                Some(index) if self.definitions[index].application_id != application_id => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::EventActionUnknownDefinitionError,
                    );
                }
                Some(index) if self.definitions[index].enabled => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::EventActionDeleteEnabledDefinitionError,
                    );
                }
                Some(index) => {
                    self.definitions.remove(index);
                }
            }
        }
    }

    /// TC[19,4] delete all event-action definitions. Also turns the global
    /// function status off.
    fn delete_all_definitions(&mut self, ctx: &mut ServiceContext<'_>, request: &Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::DeleteAllEventAction as u8,
        ) {
            return;
        }
        self.event_action_function_status = false;
        self.definitions.clear();
    }

    /// TC[19,5] / TC[19,6] enable or disable definitions. An empty list
    /// addresses every definition in the table.
    fn set_definitions_enabled(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        request: &mut Message,
        enable: bool,
    ) {
        let expected = if enable {
            MessageType::EnableEventAction
        } else {
            MessageType::DisableEventAction
        };
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, expected as u8) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        if count == 0 {
            for definition in self.definitions.iter_mut() {
                definition.enabled = enable;
            }
            return;
        }
        for _ in 0..count {
            let (application_id, event_id) =
                match request.read_u16().and_then(|a| Ok((a, request.read_u16()?))) {
                    Ok(pair) => pair,
                    Err(e) => {
                        verification::fail_acceptance(ctx, request, e);
                        return;
                    }
                };
            match self.position_of(event_id) {
                Some(index) if self.definitions[index].application_id == application_id => {
                    self.definitions[index].enabled = enable;
                }
                _ => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::EventActionUnknownDefinitionError,
                    );
                }
            }
        }
    }

    /// TC[19,7] report the status of each event-action definition with
    /// TM[19,8].
    fn request_status_report(&mut self, ctx: &mut ServiceContext<'_>, request: &Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::ReportStatusOfEachEventAction as u8,
        ) {
            return;
        }
        self.status_report(ctx);
    }

    /// TM[19,8] event-action status report.
    fn status_report(&self, ctx: &mut ServiceContext<'_>) {
        let mut report = create_tm(SERVICE_TYPE, EVENT_ACTION_STATUS_REPORT);
        let mut assembled = report.append_u16(self.definitions.len() as u16);
        for definition in &self.definitions {
            if assembled.is_err() {
                break;
            }
            assembled = report
                .append_u16(definition.application_id)
                .and_then(|()| report.append_u16(definition.event_definition_id))
                .and_then(|()| report.append_bool(definition.enabled));
        }
        if let Err(e) = assembled {
            log::error!("[EVENT_ACTION] failed to assemble status report: {e}");
            return;
        }
        store_tm(ctx, report);
    }

    /// TC[19,8] / TC[19,9] toggle the global event-action function.
    fn set_function_status(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        request: &Message,
        enable: bool,
    ) {
        let expected = if enable {
            MessageType::EnableEventActionFunction
        } else {
            MessageType::DisableEventActionFunction
        };
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, expected as u8) {
            return;
        }
        self.event_action_function_status = enable;
    }

    pub fn execute(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match MessageType::try_from(message.message_type) {
            Ok(MessageType::AddEventAction) => self.add_definitions(ctx, message),
            Ok(MessageType::DeleteEventAction) => self.delete_definitions(ctx, message),
            Ok(MessageType::DeleteAllEventAction) => self.delete_all_definitions(ctx, message),
            Ok(MessageType::EnableEventAction) => self.set_definitions_enabled(ctx, message, true),
            Ok(MessageType::DisableEventAction) => {
                self.set_definitions_enabled(ctx, message, false)
            }
            Ok(MessageType::ReportStatusOfEachEventAction) => {
                self.request_status_report(ctx, message)
            }
            Ok(MessageType::EnableEventActionFunction) => {
                self.set_function_status(ctx, message, true)
            }
            Ok(MessageType::DisableEventActionFunction) => {
                self.set_function_status(ctx, message, false)
            }
            Err(_) => {
                log::error!(
                    "[EVENT_ACTION] unexpected message type [19,{}]",
                    message.message_type
                );
                verification::fail_acceptance(ctx, message, SpacecraftError::OtherMessageType);
            }
        }
    }
}
