pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod occupancy;
pub mod recurrence;
pub mod scheduling;
pub mod slots;

pub use conflict::ConflictDetectionService;
pub use lifecycle::{SessionAction, SessionLifecycleService};
pub use locks::{DateLockRegistry, LockRegistry, TreatmentLockRegistry};
pub use occupancy::{classify_density, OccupancyIndex};
pub use recurrence::ScheduleGenerator;
pub use scheduling::SchedulingService;
pub use slots::SlotCalculator;
