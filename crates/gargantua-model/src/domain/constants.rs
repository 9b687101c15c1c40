//! Label keys and well-known names shared by every controller.
//!
//! Labels are the only contract between controllers: each one discovers its
//! peers by selector instead of holding references. Keeping the keys here
//! avoids scattering magic strings throughout the codebase.

/// Owning scheduled event of a VMSet, DBC, AccessCode, OTAC, VM or Progress.
pub const LABEL_SCHEDULED_EVENT: &str = "scheduledevent";
/// Access code a session or claim was started with.
pub const LABEL_ACCESS_CODE: &str = "accesscode";
/// One-time access code a session was started with.
pub const LABEL_ONE_TIME_ACCESS_CODE: &str = "onetimeaccesscode";
/// Owning user.
pub const LABEL_USER: &str = "user";
/// Backing environment of a VM, VMSet or DBC.
pub const LABEL_ENVIRONMENT: &str = "environment";
/// Enclosing session of a claim.
pub const LABEL_SESSION: &str = "session";
/// VMSet a static VM was materialised from.
pub const LABEL_VM_SET: &str = "vmset";
/// Restricted-bind flag (`"true"` / `"false"`).
pub const LABEL_RESTRICTED_BIND: &str = "restrictedbind";
/// Restricted-bind domain (the owning event name).
pub const LABEL_RESTRICTED_BIND_VALUE: &str = "restrictedbindvalue";
/// VM is bound to a claim.
pub const LABEL_BOUND: &str = "bound";
/// VM is ready for use.
pub const LABEL_READY: &str = "ready";
/// VM was created by dynamic placement.
pub const LABEL_DYNAMIC: &str = "dynamic";
/// Object belongs to a finished event or session.
pub const LABEL_FINISHED: &str = "finished";
/// External provisioner responsible for a VM.
pub const LABEL_PROVISIONER: &str = "provisioner";
/// Cost group an object is billed to.
pub const LABEL_COST_GROUP: &str = "cost-group";
/// Base price of a cost-bearing object.
pub const LABEL_BASE_PRICE: &str = "base-price";
/// Billing time unit of a cost-bearing object.
pub const LABEL_TIME_UNIT: &str = "time-unit";

/// Environment annotation that hands VMs to an external provisioner.
pub const ANNOTATION_PROVISIONER: &str = "provisioner";

/// Prefix of the per-template label: `virtualmachinetemplate.hobbyfarm.io/<template>`.
pub const TEMPLATE_LABEL_PREFIX: &str = "virtualmachinetemplate.hobbyfarm.io/";

/// Prefix of category labels: `category-<name>`.
pub const CATEGORY_LABEL_PREFIX: &str = "category-";

/// Setting holding the retention time (hours) of finished scheduled events.
pub const SETTING_SCHEDULED_EVENT_RETENTION_TIME: &str = "scheduledevent-retention-time";

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "gargantua";

/// Label value used for boolean labels.
pub const TRUE: &str = "true";
/// Label value used for boolean labels.
pub const FALSE: &str = "false";

/// Build the template label key for `template`.
pub fn template_label(template: &str) -> String {
    format!("{TEMPLATE_LABEL_PREFIX}{template}")
}

/// Build the category label key for `category`.
pub fn category_label(category: &str) -> String {
    format!("{CATEGORY_LABEL_PREFIX}{category}")
}

/// Render a boolean as a label value.
pub fn bool_label(value: bool) -> &'static str {
    if value { TRUE } else { FALSE }
}
