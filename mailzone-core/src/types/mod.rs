//! 类型定义模块

mod plan;
mod template;
mod zone;

pub use plan::{
    ApplyReport, ApplyStatus, ApplyStep, Operation, OperationKind, ReconciliationPlan,
};
pub use template::{MailTemplateParams, Template, TemplateRecord};
pub use zone::Zone;

// Re-export provider 库的公共类型
pub use mailzone_provider::{
    DnsRecord, DnsRecordType, ProviderZone, RecordData, RecordKey, ZoneStatus,
};
