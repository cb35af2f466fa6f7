/// Max kindergartens (tenants) loaded by one server process.
pub const MAX_TENANTS: usize = 1024;

/// Max length of a tenant (database) name.
pub const MAX_TENANT_NAME_LEN: usize = 256;

/// Max length of any free-text field (names, topic, reason, notes).
pub const MAX_TEXT_LEN: usize = 1024;

/// Max distinct slots on a single date.
pub const MAX_SLOTS_PER_DATE: usize = 96;

/// Max times accepted by a single publish call.
pub const MAX_TIMES_PER_PUBLISH: usize = 96;

/// Max published dates per tenant.
pub const MAX_DATES_PER_TENANT: usize = 10_000;

/// Max tour bookings per tenant (all statuses).
pub const MAX_TOURS_PER_TENANT: usize = 100_000;

/// Max appointments per tenant (all statuses).
pub const MAX_APPOINTMENTS_PER_TENANT: usize = 100_000;
