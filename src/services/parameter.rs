//! ST[20] parameter management.
//!
//! Thin service over the typed parameter registry: TC[20,1] reports current
//! values, TC[20,3] overwrites them. The encoding helpers are shared with
//! housekeeping, which appends parameter values into its periodic reports
//! using the registry's declared types.
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::mem::{ParameterId, ParameterType, ParameterValue};
use crate::message::Message;
use crate::services::{create_tm, store_tm, verification, ServiceContext};

pub const SERVICE_TYPE: u8 = 20;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    ReportParameterValues = 1,
    ParameterValuesReport = 2,
    SetParameterValues = 3,
}

/// Append one registry value to a message, big-endian, in the parameter's
/// declared type.
pub fn append_parameter_to_message(
    ctx: &mut ServiceContext<'_>,
    message: &mut Message,
    parameter_id: ParameterId,
) -> Result<(), SpacecraftError> {
    let value = ctx.registry.get(parameter_id)?;
    match value {
        ParameterValue::U8(v) => message.append_u8(v),
        ParameterValue::I8(v) => message.append_i8(v),
        ParameterValue::U16(v) => message.append_u16(v),
        ParameterValue::I16(v) => message.append_i16(v),
        ParameterValue::U32(v) => message.append_u32(v),
        ParameterValue::I32(v) => message.append_i32(v),
        ParameterValue::U64(v) => message.append_u64(v),
        ParameterValue::I64(v) => message.append_i64(v),
        ParameterValue::F32(v) => message.append_f32(v),
        ParameterValue::F64(v) => message.append_f64(v),
    }
}

/// Read one value in the parameter's declared type and store it in the
/// registry.
pub fn update_parameter_from_message(
    ctx: &mut ServiceContext<'_>,
    message: &mut Message,
    parameter_id: ParameterId,
) -> Result<(), SpacecraftError> {
    let declared = ctx
        .registry
        .type_of(parameter_id)
        .ok_or(SpacecraftError::NonExistingParameter)?;
    let value = match declared {
        ParameterType::U8 => ParameterValue::U8(message.read_u8()?),
        ParameterType::I8 => ParameterValue::I8(message.read_i8()?),
        ParameterType::U16 => ParameterValue::U16(message.read_u16()?),
        ParameterType::I16 => ParameterValue::I16(message.read_i16()?),
        ParameterType::U32 => ParameterValue::U32(message.read_u32()?),
        ParameterType::I32 => ParameterValue::I32(message.read_i32()?),
        ParameterType::U64 => ParameterValue::U64(message.read_u64()?),
        ParameterType::I64 => ParameterValue::I64(message.read_i64()?),
        ParameterType::F32 => ParameterValue::F32(message.read_f32()?),
        ParameterType::F64 => ParameterValue::F64(message.read_f64()?),
    };
    ctx.registry.set(parameter_id, value)?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct ParameterService;

impl ParameterService {
    /// TC[20,1] report parameter values with TM[20,2]. Only existing ids
    /// count towards the reported list.
    fn report_parameters(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::ReportParameterValues as u8,
        ) {
            return;
        }
        let count = match request.read_u16() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        let mut valid = 0u16;
        for _ in 0..count {
            match request.read_u16() {
                Ok(id) if ctx.registry.exists(id) => valid += 1,
                Ok(_) => {}
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            }
        }

        let mut report = create_tm(SERVICE_TYPE, MessageType::ParameterValuesReport as u8);
        if report.append_u16(valid).is_err() {
            return;
        }
        request.reset_read();
        let count = request.read_u16().unwrap_or(0);
        for _ in 0..count {
            let id = match request.read_u16() {
                Ok(id) => id,
                Err(_) => break,
            };
            if !ctx.registry.exists(id) {
                verification::fail_start(ctx, request, SpacecraftError::NonExistingParameter);
                continue;
            }
            let appended = report
                .append_u16(id)
                .and_then(|()| append_parameter_to_message(ctx, &mut report, id));
            if let Err(e) = appended {
                log::error!("[PARAMETER] failed to append parameter {id}: {e}");
                return;
            }
        }
        store_tm(ctx, report);
    }

    /// TC[20,3] set parameter values.
    fn set_parameters(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::SetParameterValues as u8,
        ) {
            return;
        }
        let count = match request.read_u16() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let id = match request.read_u16() {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            if let Err(e) = update_parameter_from_message(ctx, request, id) {
                // Without the declared type the value width is unknown, so
                // the rest of the request cannot be parsed.
                verification::fail_start(ctx, request, e);
                return;
            }
        }
    }

    pub fn execute(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match MessageType::try_from(message.message_type) {
            Ok(MessageType::ReportParameterValues) => self.report_parameters(ctx, message),
            Ok(MessageType::SetParameterValues) => self.set_parameters(ctx, message),
            _ => {
                log::error!(
                    "[PARAMETER] unexpected message type [20,{}]",
                    message.message_type
                );
                verification::fail_acceptance(ctx, message, SpacecraftError::OtherMessageType);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::ParameterRegistry;
    use crate::testutil::Harness;

    #[test]
    fn test_report_counts_only_existing_parameters() {
        let mut harness = Harness::new();
        harness.registry.register(100, ParameterValue::U16(0x1234));
        harness.registry.register(101, ParameterValue::U8(0x56));
        let mut service = ParameterService;

        let mut request = Message::tc(20, 1, 1);
        request.append_u16(3).unwrap();
        request.append_u16(100).unwrap();
        request.append_u16(0xFFFF).unwrap(); // unknown id
        request.append_u16(101).unwrap();
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut request);

        let reports = harness.downlink.parsed();
        let values_report = reports
            .iter()
            .find(|r| r.service_type == 20 && r.message_type == 2)
            .expect("missing TM[20,2]");
        assert_eq!(
            values_report.payload(),
            &[0, 2, 0, 100, 0x12, 0x34, 0, 101, 0x56]
        );
        // The unknown id also produced a failed-start report.
        assert!(reports.iter().any(|r| r.service_type == 1 && r.message_type == 4));
    }

    #[test]
    fn test_set_parameters() {
        let mut harness = Harness::new();
        harness.registry.register(200, ParameterValue::U32(0));
        harness.registry.register(201, ParameterValue::I16(0));
        let mut service = ParameterService;

        let mut request = Message::tc(20, 3, 1);
        request.append_u16(2).unwrap();
        request.append_u16(200).unwrap();
        request.append_u32(0xCAFE_BABE).unwrap();
        request.append_u16(201).unwrap();
        request.append_i16(-5).unwrap();
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut request);

        assert_eq!(
            harness.registry.get(200).unwrap(),
            ParameterValue::U32(0xCAFE_BABE)
        );
        assert_eq!(harness.registry.get(201).unwrap(), ParameterValue::I16(-5));
    }

    #[test]
    fn test_set_unknown_parameter_aborts() {
        let mut harness = Harness::new();
        harness.registry.register(200, ParameterValue::U32(7));
        let mut service = ParameterService;

        let mut request = Message::tc(20, 3, 1);
        request.append_u16(2).unwrap();
        request.append_u16(0xEEEE).unwrap();
        request.append_u32(1).unwrap();
        request.append_u16(200).unwrap();
        request.append_u32(2).unwrap();
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut request);

        // The unknown id aborts the batch, the later assignment never runs.
        assert_eq!(harness.registry.get(200).unwrap(), ParameterValue::U32(7));
        let reports = harness.downlink.parsed();
        assert!(reports.iter().any(|r| r.service_type == 1 && r.message_type == 4));
    }
}
