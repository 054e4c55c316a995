//! ST[05] event reporting.
//!
//! Tracks per-event enable/disable state, counts occurrences and emitted
//! reports per severity, and emits the severity-tagged TM[5,1..4] reports.
//! Raising an event goes through [crate::services::ServicePool::raise_event]
//! so that event-action bindings run after the report.
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::message::Message;
use crate::services::{create_tm, store_tm, verification, ServiceContext};
use crate::{ECSS_EVENT_DATA_AUX_MAX_SIZE, ECSS_NUMBER_OF_EVENTS};

pub const SERVICE_TYPE: u8 = 5;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    InformativeEventReport = 1,
    LowSeverityAnomalyReport = 2,
    MediumSeverityAnomalyReport = 3,
    HighSeverityAnomalyReport = 4,
    EnableReportGenerationOfEvents = 5,
    DisableReportGenerationOfEvents = 6,
    ReportListOfDisabledEvents = 7,
    DisabledListEventReport = 8,
}

/// Severity of an event occurrence, selecting the report subtype.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Severity {
    Informative,
    Low,
    Medium,
    High,
}

impl Severity {
    fn report_type(self) -> MessageType {
        match self {
            Severity::Informative => MessageType::InformativeEventReport,
            Severity::Low => MessageType::LowSeverityAnomalyReport,
            Severity::Medium => MessageType::MediumSeverityAnomalyReport,
            Severity::High => MessageType::HighSeverityAnomalyReport,
        }
    }
}

/// Known event definition ids. Numbers are kept explicit so that a renumber
/// never happens silently.
#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Event {
    UnknownEvent = 1,
    WatchdogReset = 2,
    AssertionFail = 3,
    McuStart = 4,
    /// Execution of a notification or bound action failed to start.
    FailedStartOfExecution = 5,
    InternalError = 6,
    MramError = 7,
    SafeMode = 8,
}

const NO_LAST_REPORT: u16 = u16::MAX;

/// Per-severity counters of occurrences and emitted reports.
#[derive(Debug, Default, Copy, Clone)]
pub struct SeverityCounters {
    pub event_count: u16,
    pub report_count: u16,
    pub last_report_id: u16,
}

pub struct EventReportService {
    enabled: [bool; ECSS_NUMBER_OF_EVENTS + 1],
    pub low_severity: SeverityCounters,
    pub medium_severity: SeverityCounters,
    pub high_severity: SeverityCounters,
    pub disabled_events_count: u16,
    internal_error_count: u16,
}

impl Default for EventReportService {
    fn default() -> Self {
        let mut service = EventReportService {
            enabled: [true; ECSS_NUMBER_OF_EVENTS + 1],
            low_severity: SeverityCounters::default(),
            medium_severity: SeverityCounters::default(),
            high_severity: SeverityCounters::default(),
            disabled_events_count: 0,
            internal_error_count: 0,
        };
        service.low_severity.last_report_id = NO_LAST_REPORT;
        service.medium_severity.last_report_id = NO_LAST_REPORT;
        service.high_severity.last_report_id = NO_LAST_REPORT;
        service
    }
}

impl EventReportService {
    fn valid_event_id(event_id: u16) -> bool {
        (1..=ECSS_NUMBER_OF_EVENTS as u16).contains(&event_id)
    }

    pub fn is_enabled(&self, event_id: u16) -> bool {
        Self::valid_event_id(event_id) && self.enabled[usize::from(event_id)]
    }

    fn counters_mut(&mut self, severity: Severity) -> Option<&mut SeverityCounters> {
        match severity {
            Severity::Informative => None,
            Severity::Low => Some(&mut self.low_severity),
            Severity::Medium => Some(&mut self.medium_severity),
            Severity::High => Some(&mut self.high_severity),
        }
    }

    /// Emit a TM[5,1..4] report for one event occurrence. Returns true when
    /// a report was generated (the event exists and is enabled), which is
    /// the trigger for the event-action binder.
    pub fn report(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        event_id: u16,
        severity: Severity,
        aux_data: &[u8],
    ) -> bool {
        if !Self::valid_event_id(event_id) || aux_data.len() > ECSS_EVENT_DATA_AUX_MAX_SIZE {
            self.internal_error_count = self.internal_error_count.wrapping_add(1);
            log::error!("[EVENT] dropping report with invalid event id {event_id}");
            return false;
        }
        if let Some(counters) = self.counters_mut(severity) {
            counters.event_count = counters.event_count.wrapping_add(1);
        }
        if !self.enabled[usize::from(event_id)] {
            self.disabled_events_count = self.disabled_events_count.wrapping_add(1);
            return false;
        }
        if let Some(counters) = self.counters_mut(severity) {
            counters.report_count = counters.report_count.wrapping_add(1);
            counters.last_report_id = event_id;
        }

        let mut report = create_tm(SERVICE_TYPE, severity.report_type() as u8);
        let assembled = report
            .append_u16(event_id)
            .and_then(|()| report_append_aux(&mut report, aux_data));
        if let Err(e) = assembled {
            log::error!("[EVENT] failed to assemble event report: {e}");
            return false;
        }
        store_tm(ctx, report);
        true
    }

    /// TC[5,5] enable report generation for the listed event definitions.
    fn enable_report_generation(&mut self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::EnableReportGenerationOfEvents as u8,
        ) {
            return;
        }
        self.set_report_generation(ctx, request, true);
    }

    /// TC[5,6] disable report generation for the listed event definitions.
    fn disable_report_generation(&mut self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::DisableReportGenerationOfEvents as u8,
        ) {
            return;
        }
        self.set_report_generation(ctx, request, false);
    }

    fn set_report_generation(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        request: &mut Message,
        enable: bool,
    ) {
        let count = match request.read_u16() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let event_id = match request.read_u16() {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            if !Self::valid_event_id(event_id) {
                verification::fail_start(ctx, request, SpacecraftError::InvalidArgument);
                continue;
            }
            self.enabled[usize::from(event_id)] = enable;
        }
    }

    /// TC[5,7] request the list of disabled event definitions, answered with
    /// the TM[5,8] disabled-list report.
    fn request_list_of_disabled_events(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        request: &Message,
    ) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::ReportListOfDisabledEvents as u8,
        ) {
            return;
        }
        self.list_of_disabled_events_report(ctx);
    }

    /// TM[5,8] disabled event definitions report.
    fn list_of_disabled_events_report(&self, ctx: &mut ServiceContext<'_>) {
        let disabled: Vec<u16> = (1..=ECSS_NUMBER_OF_EVENTS as u16)
            .filter(|&id| !self.enabled[usize::from(id)])
            .collect();

        let mut report = create_tm(SERVICE_TYPE, MessageType::DisabledListEventReport as u8);
        let mut assembled = report.append_u16(disabled.len() as u16);
        for id in &disabled {
            if assembled.is_err() {
                break;
            }
            assembled = report.append_u16(*id);
        }
        if let Err(e) = assembled {
            log::error!("[EVENT] failed to assemble disabled-list report: {e}");
            return;
        }
        store_tm(ctx, report);
    }

    pub fn execute(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match MessageType::try_from(message.message_type) {
            Ok(MessageType::EnableReportGenerationOfEvents) => {
                self.enable_report_generation(ctx, message)
            }
            Ok(MessageType::DisableReportGenerationOfEvents) => {
                self.disable_report_generation(ctx, message)
            }
            Ok(MessageType::ReportListOfDisabledEvents) => {
                self.request_list_of_disabled_events(ctx, message)
            }
            _ => {
                log::error!(
                    "[EVENT] unexpected message type [5,{}]",
                    message.message_type
                );
                verification::fail_acceptance(ctx, message, SpacecraftError::OtherMessageType);
            }
        }
    }
}

fn report_append_aux(report: &mut Message, aux_data: &[u8]) -> Result<(), SpacecraftError> {
    report.append_string(aux_data)
}
