mod user;
pub use user::{ACCOUNT_ACTIVE, UserEntity, UserEntityCreateUpdate};

mod refresh_token;
pub use refresh_token::{RefreshToken, RefreshTokenCreate};

mod oauth_account;
pub use oauth_account::{OAuthAccount, ProviderTokens};

mod pathway;
pub use pathway::{Pathway, PathwayCreate};

mod module;
pub use module::{Module, ModuleCreate};

mod resource;
pub use resource::{RESOURCE_TYPES, Resource, ResourceCreate};

mod user_progress;
pub use user_progress::{PathwayProgressRow, UserProgress, UserProgressUpdate};

mod module_completion;
pub use module_completion::{APPROVAL_STATUSES, ModuleCompletion, PendingModuleCompletionRow};

mod resource_completion;
pub use resource_completion::{
    FINISHED_STATUSES, LEARNER_STATUSES, ResourceCompletion, ResourceProgressUpdate,
};

mod submission;
pub use submission::{
    GRADES, PendingSubmissionRow, REVIEW_STATUSES, Submission, SubmissionCreate, SubmissionStats,
};

mod achievement;
pub use achievement::{
    Achievement, AchievementStatusRow, EarnedAchievementRow, UserStats,
};

mod streak;
pub use streak::LearningStreak;

mod email_log;
pub use email_log::{EmailLinks, EmailLog, EmailLogCreate};
