pub mod filters;
pub mod page;
pub mod person;
pub mod task;
pub mod ticket;

pub use filters::{AssignedTaskFilters, AssignmentStatusFilter, RosterFilters, TicketHistoryFilters};
pub use page::Page;
pub use person::{Admin, Parent, Student, StudentStatus, Teacher};
pub use task::{AssignedTask, AssignedTaskUpdate, NewAssignedTask, VerificationStatus};
pub use ticket::{StreakStats, TicketTransaction, TransactionKind};
