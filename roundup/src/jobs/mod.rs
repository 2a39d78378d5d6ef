//! Background returns jobs.
//!
//! `POST .../returns:{nps,index}:async` registers a job, answers with its id
//! right away and computes on the blocking pool. Clients poll
//! `GET .../jobs/{id}` until the status leaves `processing`.

mod manager;

pub use manager::{JobManager, JobRecord, JobStatus};
