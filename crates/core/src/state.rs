use std::sync::Arc;

use sa_domain::config::Config;

use crate::calendar::Calendar;
use crate::job_store::JobStore;
use crate::runtime::cancel::CancelMap;
use crate::runtime::executor::Executor;
use crate::runtime::schedules::RuleStore;
use crate::scheduler::Scheduler;

/// Shared application state: the C1-C5 services plus the config they
/// were built from.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: Arc<JobStore>,
    pub rules: Arc<RuleStore>,
    pub calendar: Arc<Calendar>,
    pub executor: Arc<Executor>,
    pub cancel_map: Arc<CancelMap>,
    pub scheduler: Arc<Scheduler>,
}
