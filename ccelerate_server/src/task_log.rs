#![deny(clippy::unwrap_used)]

use crate::{
    state::State,
    task_periods::{TaskPeriodInfo, TaskPeriodScope},
};

pub fn log_task(task: impl TaskPeriodInfo + 'static, state: &State) -> TaskPeriodScope {
    state.task_periods.start(task)
}
