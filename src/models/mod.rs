pub mod session;
pub mod sync;
pub mod template;
pub mod workout;

pub use session::{ActiveSession, NewSession, RestTimer, SessionExercise};
pub use sync::{FailureKind, PendingOperation, SyncState, SyncStatus};
pub use template::{NewTemplateExercise, NewWorkoutTemplate, TemplateExercise, TemplateUpdate, WorkoutTemplate};
pub use workout::{ExerciseLog, WorkoutLog, WorkoutSet, WorkoutTotals};
