//! The PUS service implementations and their dispatcher.
//!
//! Every handler runs on the TC handling task and receives a
//! [ServiceContext] carrying exclusive references to the process-wide
//! collaborators (store, registry, clock, downlink, queues, counters). The
//! [ServicePool] owns the per-service state and routes parsed telecommands by
//! service type; services compiled out via the `service-*` features fall
//! through to the internal-error path.
use crate::error::SpacecraftError;
use crate::mem::{MemoryStore, ParameterRegistry};
use crate::message::Message;
use crate::seq_count::CounterBank;
use crate::time::Clock;
use crate::{codec, APPLICATION_ID, ECSS_TM_SECONDARY_HEADER_SIZE};

#[cfg(feature = "service-event-action")]
pub mod event_action;
#[cfg(feature = "service-event-report")]
pub mod event;
#[cfg(feature = "service-function")]
pub mod function;
#[cfg(feature = "service-housekeeping")]
pub mod housekeeping;
#[cfg(feature = "service-large-packet")]
pub mod large_packet;
#[cfg(feature = "service-parameter")]
pub mod parameter;
#[cfg(feature = "service-time-scheduling")]
pub mod scheduling;
pub mod verification;

/// Consumer of composed telemetry frames (the downlink store).
pub trait TmSink {
    /// Hand over one composed frame. Returns false when the store rejected
    /// it, e.g. on a full buffer.
    fn store(&mut self, frame: &[u8]) -> bool;
}

/// The bounded queue feeding the TC handling task. Released scheduled
/// activities are injected here.
pub trait TcUplinkQueue {
    /// Returns false when the enqueue timed out; the caller logs and drops.
    fn enqueue(&mut self, request: Message, priority: u8) -> bool;
}

/// Wakeup line towards the scheduler tick task.
pub trait SchedulerHook {
    /// Signal that the schedule changed and the next release time must be
    /// re-evaluated.
    fn poke(&mut self);
}

/// Queue priority used for released scheduled telecommands.
pub const RELEASED_TC_PRIORITY: u8 = 20;

/// Exclusive references to everything a handler may touch, threaded by
/// `&mut` through the dispatcher instead of a mutable global.
pub struct ServiceContext<'a> {
    pub store: &'a mut dyn MemoryStore,
    pub registry: &'a mut dyn ParameterRegistry,
    pub clock: &'a dyn Clock,
    pub downlink: &'a mut dyn TmSink,
    pub tc_queue: &'a mut dyn TcUplinkQueue,
    pub scheduler: &'a mut dyn SchedulerHook,
    pub counters: &'a mut CounterBank,
}

/// Start a telemetry report of this application.
pub(crate) fn create_tm(service_type: u8, message_type: u8) -> Message {
    Message::tm(service_type, message_type, APPLICATION_ID)
}

/// Finalize a report and push its composed frame to the downlink.
pub(crate) fn store_tm(ctx: &mut ServiceContext<'_>, mut report: Message) {
    report.finalize(ctx.counters);
    let ecss_total = report.data_len() + ECSS_TM_SECONDARY_HEADER_SIZE as u16;
    match codec::compose(&report, ecss_total, ctx.clock) {
        Ok(frame) => {
            if !ctx.downlink.store(&frame) {
                log::error!(
                    "[TM_STORE] downlink rejected TM[{},{}]",
                    report.service_type,
                    report.message_type
                );
            }
        }
        Err(e) => {
            log::error!(
                "[TM_STORE] failed to compose TM[{},{}]: {}",
                report.service_type,
                report.message_type,
                e
            );
        }
    }
}

/// The per-service state of the stack.
#[derive(Default)]
pub struct ServicePool {
    #[cfg(feature = "service-event-report")]
    pub event_report: event::EventReportService,
    #[cfg(feature = "service-event-action")]
    pub event_action: event_action::EventActionService,
    #[cfg(feature = "service-function")]
    pub function_management: function::FunctionManagementService,
    #[cfg(feature = "service-housekeeping")]
    pub housekeeping: housekeeping::HousekeepingService,
    #[cfg(feature = "service-large-packet")]
    pub large_packet: large_packet::LargePacketTransferService,
    #[cfg(feature = "service-time-scheduling")]
    pub scheduling: scheduling::TimeBasedSchedulingService,
    #[cfg(feature = "service-parameter")]
    pub parameter: parameter::ParameterService,
    #[cfg(feature = "service-test")]
    pub test: test::TestService,
    /// Set while an event-action cascade is running, to keep a failing bound
    /// function from re-entering the binder.
    #[cfg(feature = "service-event-action")]
    in_event_cascade: bool,
}

impl ServicePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one parsed telecommand to its service handler.
    pub fn dispatch(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match message.service_type {
            #[cfg(feature = "service-housekeeping")]
            housekeeping::SERVICE_TYPE => self.housekeeping.execute(ctx, message),
            #[cfg(feature = "service-event-report")]
            event::SERVICE_TYPE => self.event_report.execute(ctx, message),
            #[cfg(feature = "service-function")]
            function::SERVICE_TYPE => self.execute_function_service(ctx, message),
            #[cfg(feature = "service-time-scheduling")]
            scheduling::SERVICE_TYPE => self.scheduling.execute(ctx, message),
            #[cfg(feature = "service-large-packet")]
            large_packet::SERVICE_TYPE => self.large_packet.execute(ctx, message),
            #[cfg(feature = "service-test")]
            test::SERVICE_TYPE => self.test.execute(ctx, message),
            #[cfg(feature = "service-event-action")]
            event_action::SERVICE_TYPE => self.event_action.execute(ctx, message),
            #[cfg(feature = "service-parameter")]
            parameter::SERVICE_TYPE => self.parameter.execute(ctx, message),
            other => {
                log::error!("[DISPATCH] no service built in for type {other}");
                self.report_internal_error(ctx, SpacecraftError::OtherMessageType);
            }
        }
    }

    /// Internal errors are never surfaced over TM with a request identity:
    /// they are logged and raised as a failed-start-of-execution event.
    pub(crate) fn report_internal_error(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        code: SpacecraftError,
    ) {
        log::error!("[INTERNAL] {code}");
        #[cfg(feature = "service-event-report")]
        {
            let aux = u16::from(code).to_be_bytes();
            self.raise_event(
                ctx,
                event::Event::FailedStartOfExecution as u16,
                event::Severity::Low,
                &aux,
            );
        }
        #[cfg(not(feature = "service-event-report"))]
        {
            let _ = (ctx, code);
        }
    }

    /// Raise an on-board event: emit the severity-tagged report (if the event
    /// is enabled) and run any event-action bindings for it.
    #[cfg(feature = "service-event-report")]
    pub fn raise_event(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        event_id: u16,
        severity: event::Severity,
        aux_data: &[u8],
    ) {
        let reported = self.event_report.report(ctx, event_id, severity, aux_data);
        #[cfg(feature = "service-event-action")]
        if reported && !self.in_event_cascade {
            self.on_event(ctx, event_id);
        }
        #[cfg(not(feature = "service-event-action"))]
        let _ = reported;
    }

    /// Run the event-action bindings of one event through the function
    /// manager.
    #[cfg(feature = "service-event-action")]
    fn on_event(&mut self, ctx: &mut ServiceContext<'_>, event_id: u16) {
        if !self.event_action.function_status() {
            return;
        }
        let actions = self.event_action.enabled_actions(event_id);
        self.in_event_cascade = true;
        for (function_id, args) in actions {
            let _ = self.call_function(ctx, function_id, &args);
        }
        self.in_event_cascade = false;
    }

    /// Invoke a registered function by id. An unknown id returns
    /// [SpacecraftError::FunctionNotFound] and raises the
    /// failed-start-of-execution event.
    #[cfg(feature = "service-function")]
    pub fn call_function(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        function_id: u16,
        args: &[u8; crate::ECSS_FUNCTION_MAX_ARG_LENGTH],
    ) -> Result<(), SpacecraftError> {
        match self.function_management.call(function_id, args) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("[FUNCTION] call of function {function_id} failed: {e}");
                #[cfg(feature = "service-event-report")]
                {
                    #[cfg(feature = "service-event-action")]
                    let in_cascade = self.in_event_cascade;
                    #[cfg(not(feature = "service-event-action"))]
                    let in_cascade = false;
                    if !in_cascade {
                        let aux = function_id.to_be_bytes();
                        self.raise_event(
                            ctx,
                            event::Event::FailedStartOfExecution as u16,
                            event::Severity::Low,
                            &aux,
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// ST[08] entry point: TC[8,1] perform-function.
    #[cfg(feature = "service-function")]
    fn execute_function_service(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match message.message_type {
            x if x == function::MessageType::PerformFunction as u8 => {
                self.perform_function(ctx, message)
            }
            _ => self.report_internal_error(ctx, SpacecraftError::OtherMessageType),
        }
    }

    #[cfg(feature = "service-function")]
    fn perform_function(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        use crate::ECSS_FUNCTION_MAX_ARG_LENGTH;

        if !verification::guard_tc(
            ctx,
            message,
            function::SERVICE_TYPE,
            function::MessageType::PerformFunction as u8,
        ) {
            return;
        }
        let function_id = match message.read_u16() {
            Ok(id) => id,
            Err(e) => {
                verification::fail_acceptance(ctx, message, e);
                return;
            }
        };
        message.function_id = function_id;

        let arg_bytes = message.remaining();
        if arg_bytes.len() > ECSS_FUNCTION_MAX_ARG_LENGTH {
            verification::fail_acceptance(ctx, message, SpacecraftError::UnacceptableMessage);
            return;
        }
        let mut args = [0u8; ECSS_FUNCTION_MAX_ARG_LENGTH];
        args[..arg_bytes.len()].copy_from_slice(arg_bytes);

        match self.call_function(ctx, function_id, &args) {
            Ok(()) => verification::success_completion(ctx, message),
            Err(e) => verification::fail_completion(ctx, message, e),
        }
    }
}
