//! ST[01] request verification.
//!
//! Every report replays the request identity — version, packet type,
//! secondary header flag, APID, sequence flags and sequence count, plus the
//! function id for function-managed telecommands — so ground can correlate
//! the verification with the originating telecommand. Failure variants
//! append the 16-bit error code; progress variants carry a step id.
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::message::Message;
use crate::services::{create_tm, store_tm, ServiceContext};

pub const SERVICE_TYPE: u8 = 1;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    SuccessfulAcceptanceReport = 1,
    FailedAcceptanceReport = 2,
    SuccessfulStartOfExecution = 3,
    FailedStartOfExecution = 4,
    SuccessfulProgressOfExecution = 5,
    FailedProgressOfExecution = 6,
    SuccessfulCompletionOfExecution = 7,
    FailedCompletionOfExecution = 8,
    FailedRoutingReport = 10,
}

/// Replay of the request identity common to all verification reports.
fn assemble_report(report: &mut Message, request: &Message) -> Result<(), SpacecraftError> {
    report.append_bits(3, 0)?;
    report.append_bits(1, request.packet_type as u16)?;
    report.append_bits(1, 1)?;
    report.append_bits(11, request.application_id)?;
    report.append_bits(2, 0b11)?;
    report.append_bits(14, request.sequence_count)?;
    report.append_u16(request.function_id)
}

fn emit(
    ctx: &mut ServiceContext<'_>,
    request: &Message,
    message_type: MessageType,
    step: Option<u8>,
    code: Option<SpacecraftError>,
) {
    #[cfg(feature = "service-request-verification")]
    {
        let mut report = create_tm(SERVICE_TYPE, message_type as u8);
        let mut assembled = assemble_report(&mut report, request);
        if assembled.is_ok() {
            if let Some(step) = step {
                assembled = report.append_u8(step);
            }
        }
        if assembled.is_ok() {
            if let Some(code) = code {
                assembled = report.append_u16(code.into());
            }
        }
        if let Err(e) = assembled {
            log::error!("[VERIFICATION] failed to assemble TM[1,{}]: {e}", message_type as u8);
            return;
        }
        store_tm(ctx, report);
    }
    #[cfg(not(feature = "service-request-verification"))]
    let _ = (ctx, request, message_type, step, code);
}

/// Handler entry guard: emits a failed acceptance when the message is not a
/// telecommand of the expected (service, type).
pub fn guard_tc(
    ctx: &mut ServiceContext<'_>,
    request: &Message,
    service_type: u8,
    message_type: u8,
) -> bool {
    if request.assert_tc(service_type, message_type) {
        return true;
    }
    log::warn!(
        "[VERIFICATION] message [{},{}] is not the expected TC[{},{}]",
        request.service_type,
        request.message_type,
        service_type,
        message_type
    );
    fail_acceptance(ctx, request, SpacecraftError::OtherMessageType);
    false
}

/// TM[1,1] successful acceptance verification report.
pub fn success_acceptance(ctx: &mut ServiceContext<'_>, request: &Message) {
    emit(ctx, request, MessageType::SuccessfulAcceptanceReport, None, None);
}

/// TM[1,2] failed acceptance verification report.
pub fn fail_acceptance(ctx: &mut ServiceContext<'_>, request: &Message, code: SpacecraftError) {
    log::warn!("[VERIFICATION] acceptance failed: {code}");
    emit(ctx, request, MessageType::FailedAcceptanceReport, None, Some(code));
}

/// TM[1,3] successful start of execution verification report.
pub fn success_start(ctx: &mut ServiceContext<'_>, request: &Message) {
    emit(ctx, request, MessageType::SuccessfulStartOfExecution, None, None);
}

/// TM[1,4] failed start of execution verification report.
pub fn fail_start(ctx: &mut ServiceContext<'_>, request: &Message, code: SpacecraftError) {
    log::warn!("[VERIFICATION] start of execution failed: {code}");
    emit(ctx, request, MessageType::FailedStartOfExecution, None, Some(code));
}

/// TM[1,5] successful progress of execution verification report.
pub fn success_progress(ctx: &mut ServiceContext<'_>, request: &Message, step: u8) {
    emit(
        ctx,
        request,
        MessageType::SuccessfulProgressOfExecution,
        Some(step),
        None,
    );
}

/// TM[1,6] failed progress of execution verification report.
pub fn fail_progress(
    ctx: &mut ServiceContext<'_>,
    request: &Message,
    code: SpacecraftError,
    step: u8,
) {
    log::warn!("[VERIFICATION] progress step {step} failed: {code}");
    emit(
        ctx,
        request,
        MessageType::FailedProgressOfExecution,
        Some(step),
        Some(code),
    );
}

/// TM[1,7] successful completion of execution verification report.
pub fn success_completion(ctx: &mut ServiceContext<'_>, request: &Message) {
    emit(
        ctx,
        request,
        MessageType::SuccessfulCompletionOfExecution,
        None,
        None,
    );
}

/// TM[1,8] failed completion of execution verification report.
pub fn fail_completion(ctx: &mut ServiceContext<'_>, request: &Message, code: SpacecraftError) {
    log::warn!("[VERIFICATION] completion failed: {code}");
    emit(
        ctx,
        request,
        MessageType::FailedCompletionOfExecution,
        None,
        Some(code),
    );
}

/// TM[1,10] failed routing verification report.
pub fn fail_routing(ctx: &mut ServiceContext<'_>, request: &Message, code: SpacecraftError) {
    log::warn!("[VERIFICATION] routing failed: {code}");
    emit(ctx, request, MessageType::FailedRoutingReport, None, Some(code));
}
