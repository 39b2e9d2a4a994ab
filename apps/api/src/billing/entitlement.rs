use crate::errors::AppError;
use crate::models::plan::Plan;

/// Access is granted iff the current plan ranks at or above the required tier.
pub fn can_access(current: Plan, required: Plan) -> bool {
    current.rank() >= required.rank()
}

/// `can_access` as a guard: `AccessDenied` carries the tier the caller needs.
pub fn require(current: Plan, required: Plan) -> Result<(), AppError> {
    if can_access(current, required) {
        Ok(())
    } else {
        Err(AppError::AccessDenied { required })
    }
}
