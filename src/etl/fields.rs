//! Field labels of the source and target tables.
//!
//! These are part of the data contract with the tables, not user settings.
//! Only the date field key is configurable.

pub const STATUS: &str = "工作状态";
pub const DEPARTMENT: &str = "部门";
pub const NAME: &str = "姓名";
pub const WORKLOG: &str = "工作日志";
pub const NOTES: &str = "问题与沟通";

/// Check-marker field used by reviewers to flag bad source rows.
pub const CHECK: &str = "检查";

/// `(project name, project hours)` label pairs of the source table, in slot order.
pub const PROJECT_SLOTS: [(&str, &str); 3] = [
    ("项目名称-1", "项目工时-1"),
    ("项目名称-2", "项目工时-2"),
    ("项目名称-3", "项目工时-3"),
];

/// Project name column of the target table.
pub const TARGET_PROJECT: &str = "项目名称";
/// Hours column of the target table.
pub const TARGET_HOURS: &str = "工时";

/// Check-marker substring flagging a row with no real content.
pub const EMPTY_DATA_SENTINEL: &str = "空数据";
/// Check-marker substring flagging a row entered twice.
pub const DUPLICATE_SENTINEL: &str = "重复填写";

/// Placeholder written into unset project slots.
pub const UNSET_PLACEHOLDER: &str = "None";

pub const DEFAULT_DATE_FIELD: &str = "日期";
