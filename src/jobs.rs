//! An in-process job queue and the worker that runs the archiving jobs.
//!
//! Jobs only carry report IDs. Each job re-reads the report when it runs, so a
//! job that is delivered late or more than once acts on the current state of
//! the report.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::Connection;

use crate::{
    ArchiveConfig, Error,
    report::{
        Mailer, ReportEvent, ReportId, ReportStatus, UnfinishedReport, consolidate_report,
        generate_report, get_unfinished_reports, schedule_monthly_reports, send_report_email,
    },
};

/// How many times a job is attempted before it is dropped.
pub const MAX_JOB_ATTEMPTS: u32 = 3;

/// A unit of archiving work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Create this period's report for every account.
    ScheduleMonthlyReports,
    /// Tag, export and attach the file for a report.
    GenerateReport(ReportId),
    /// Email a report's file to its account's users.
    SendReport(ReportId),
    /// Replace a report's archived transactions with cutoff transactions.
    ConsolidateReport(ReportId),
}

impl Job {
    /// The jobs that react to `event`.
    pub fn for_event(event: ReportEvent) -> [Job; 2] {
        match event {
            ReportEvent::ArtifactAttached { report_id } => [
                Job::SendReport(report_id),
                Job::ConsolidateReport(report_id),
            ],
        }
    }

    /// The jobs that carry `unfinished` on from the step it stopped at.
    pub fn for_unfinished(unfinished: &UnfinishedReport) -> Vec<Job> {
        let report = &unfinished.report;
        let mut jobs = Vec::new();

        if !unfinished.has_artifact {
            if report.status == ReportStatus::InProcess {
                jobs.push(Job::GenerateReport(report.id));
            }
            return jobs;
        }

        if !report.email_sent {
            jobs.push(Job::SendReport(report.id));
        }
        if report.status == ReportStatus::InProcess {
            jobs.push(Job::ConsolidateReport(report.id));
        }

        jobs
    }
}

#[derive(Debug, Clone, Copy)]
struct QueuedJob {
    job: Job,
    attempts: u32,
}

/// A first-in first-out queue of jobs shared between the HTTP handlers and the worker.
#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    jobs: Arc<Mutex<VecDeque<QueuedJob>>>,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `job` to the back of the queue.
    pub fn enqueue(&self, job: Job) -> Result<(), Error> {
        tracing::debug!("Enqueuing {job:?}");
        self.lock()?.push_back(QueuedJob { job, attempts: 0 });

        Ok(())
    }

    /// Enqueue the jobs that react to `event`.
    pub fn dispatch(&self, event: ReportEvent) -> Result<(), Error> {
        let mut jobs = self.lock()?;

        for job in Job::for_event(event) {
            tracing::debug!("Enqueuing {job:?} for {event:?}");
            jobs.push_back(QueuedJob { job, attempts: 0 });
        }

        Ok(())
    }

    /// Add each of `jobs` that is not already waiting to run.
    ///
    /// Returns the number of jobs added.
    pub fn enqueue_missing(&self, jobs: impl IntoIterator<Item = Job>) -> Result<usize, Error> {
        let mut queued = self.lock()?;
        let mut added = 0;

        for job in jobs {
            if queued.iter().any(|waiting| waiting.job == job) {
                continue;
            }

            tracing::debug!("Enqueuing {job:?}");
            queued.push_back(QueuedJob { job, attempts: 0 });
            added += 1;
        }

        Ok(added)
    }

    /// The number of jobs waiting to run.
    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.lock()?.len())
    }

    /// Whether there are no jobs waiting to run.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.lock()?.is_empty())
    }

    /// The jobs waiting to run, front first.
    pub fn pending(&self) -> Result<Vec<Job>, Error> {
        Ok(self.lock()?.iter().map(|queued| queued.job).collect())
    }

    fn pop(&self) -> Result<Option<QueuedJob>, Error> {
        Ok(self.lock()?.pop_front())
    }

    fn requeue(&self, queued: QueuedJob) -> Result<(), Error> {
        self.lock()?.push_back(queued);

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<QueuedJob>>, Error> {
        self.jobs.lock().map_err(|error| {
            tracing::error!("could not acquire job queue lock: {error}");
            Error::JobQueueLockError
        })
    }
}

/// The tally of a [Worker::run_until_idle] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkSummary {
    /// Jobs that ran without error.
    pub succeeded: usize,
    /// Failed attempts that were put back on the queue.
    pub retried: usize,
    /// Jobs that failed [MAX_JOB_ATTEMPTS] times and were dropped.
    pub dropped: usize,
}

/// Runs queued jobs one at a time.
#[derive(Clone)]
pub struct Worker {
    queue: JobQueue,
    db_connection: Arc<Mutex<Connection>>,
    mailer: Arc<dyn Mailer>,
    config: ArchiveConfig,
}

impl Worker {
    /// Create a worker that takes jobs from `queue`.
    pub fn new(
        queue: JobQueue,
        db_connection: Arc<Mutex<Connection>>,
        mailer: Arc<dyn Mailer>,
        config: ArchiveConfig,
    ) -> Self {
        Self {
            queue,
            db_connection,
            mailer,
            config,
        }
    }

    /// Enqueue the jobs for every report that has work left, such as the
    /// reports whose jobs were lost when the process stopped.
    ///
    /// Jobs that are already waiting are not added again.
    ///
    /// Returns the number of jobs added.
    ///
    /// # Errors
    /// Returns an error if the reports cannot be read or a lock is poisoned.
    pub fn resume_unfinished_reports(&self) -> Result<usize, Error> {
        let connection = self.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        self.enqueue_unfinished(&connection)
    }

    /// Run jobs until the queue is empty, including the jobs that running
    /// other jobs enqueues.
    ///
    /// A failing job is put at the back of the queue until it has been
    /// attempted [MAX_JOB_ATTEMPTS] times.
    ///
    /// # Errors
    /// Returns an error only if the queue or database lock is poisoned.
    pub fn run_until_idle(&self) -> Result<WorkSummary, Error> {
        let mut summary = WorkSummary::default();

        while let Some(mut queued) = self.queue.pop()? {
            queued.attempts += 1;

            let result = {
                let connection = self.db_connection.lock().map_err(|error| {
                    tracing::error!("could not acquire database lock: {error}");
                    Error::DatabaseLockError
                })?;

                self.run(queued.job, &connection)
            };

            match result {
                Ok(()) => summary.succeeded += 1,
                Err(error) if queued.attempts < MAX_JOB_ATTEMPTS => {
                    tracing::warn!(
                        "{:?} failed on attempt {}/{MAX_JOB_ATTEMPTS}: {error}",
                        queued.job,
                        queued.attempts
                    );
                    self.queue.requeue(queued)?;
                    summary.retried += 1;
                }
                Err(error) => {
                    tracing::error!(
                        "{:?} failed {MAX_JOB_ATTEMPTS} times, dropping it: {error}",
                        queued.job
                    );
                    summary.dropped += 1;
                }
            }
        }

        Ok(summary)
    }

    fn run(&self, job: Job, connection: &Connection) -> Result<(), Error> {
        tracing::debug!("Running {job:?}");

        match job {
            Job::ScheduleMonthlyReports => {
                self.enqueue_unfinished(connection)?;

                let cutoff_date = self.config.cutoff_date(self.config.today()?)?;

                for report_id in schedule_monthly_reports(cutoff_date, connection)? {
                    self.queue.enqueue(Job::GenerateReport(report_id))?;
                }
            }
            Job::GenerateReport(report_id) => {
                let outcome = generate_report(report_id, self.config.export_batch_size, connection)?;

                if let Some(event) = outcome.event() {
                    self.queue.dispatch(event)?;
                }
            }
            Job::SendReport(report_id) => {
                send_report_email(report_id, self.mailer.as_ref(), connection)?;
            }
            Job::ConsolidateReport(report_id) => {
                consolidate_report(report_id, self.config.today()?, connection)?;
            }
        }

        Ok(())
    }

    fn enqueue_unfinished(&self, connection: &Connection) -> Result<usize, Error> {
        let jobs: Vec<Job> = get_unfinished_reports(connection)?
            .iter()
            .flat_map(Job::for_unfinished)
            .collect();

        let added = self.queue.enqueue_missing(jobs)?;

        if added > 0 {
            tracing::info!("Resumed {added} jobs for unfinished reports");
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use time::Duration;

    use crate::{
        ArchiveConfig, Error,
        account::get_account_balance,
        config::months_before,
        report::{
            Mailer, ReportEmail, ReportEvent, ReportStatus, generate_report, get_account_reports,
            get_artifact, schedule_monthly_reports,
        },
        test_utils::{
            Fixture, create_fixture, create_fixture_with_name, get_test_connection,
            insert_transaction,
        },
        transaction::{TransactionKind, count_transactions},
    };

    use super::{Job, JobQueue, MAX_JOB_ATTEMPTS, WorkSummary, Worker};

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<ReportEmail>>,
    }

    impl Mailer for RecordingMailer {
        fn deliver(&self, email: &ReportEmail) -> Result<(), Error> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    impl Mailer for FailingMailer {
        fn deliver(&self, _email: &ReportEmail) -> Result<(), Error> {
            Err(Error::MailError("mail server down".to_owned()))
        }
    }

    struct TestWorker {
        queue: JobQueue,
        connection: Arc<Mutex<Connection>>,
        fixture: Fixture,
        worker: Worker,
    }

    fn get_test_worker(mailer: Arc<dyn Mailer>) -> TestWorker {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let connection = Arc::new(Mutex::new(connection));
        let queue = JobQueue::new();
        let worker = Worker::new(
            queue.clone(),
            connection.clone(),
            mailer,
            ArchiveConfig::default(),
        );

        TestWorker {
            queue,
            connection,
            fixture,
            worker,
        }
    }

    #[test]
    fn artifact_event_fans_out_to_send_and_consolidate() {
        let queue = JobQueue::new();

        queue
            .dispatch(ReportEvent::ArtifactAttached { report_id: 7 })
            .unwrap();

        assert_eq!(
            queue.pending().unwrap(),
            vec![Job::SendReport(7), Job::ConsolidateReport(7)]
        );
    }

    #[test]
    fn archives_old_transactions_end_to_end() {
        let mailer = Arc::new(RecordingMailer::default());
        let test = get_test_worker(mailer.clone());
        let today = ArchiveConfig::default().today().unwrap();
        let (old_ids, recent_ids, balance_before) = {
            let connection = test.connection.lock().unwrap();
            let mut old_ids = Vec::new();
            for (i, amount) in [-200, -400, -600, -800, -1_000].into_iter().enumerate() {
                let date = months_before(today, 7 + (i as u32 % 3)).unwrap();
                let transaction = insert_transaction(
                    &test.fixture.cash,
                    TransactionKind::Expense,
                    amount,
                    date,
                    &connection,
                );
                old_ids.push(transaction.id);
            }
            let mut recent_ids = Vec::new();
            for months in 2..=4 {
                let transaction = insert_transaction(
                    &test.fixture.cash,
                    TransactionKind::Expense,
                    -100,
                    months_before(today, months).unwrap(),
                    &connection,
                );
                recent_ids.push(transaction.id);
            }
            let balance = get_account_balance(test.fixture.account.id, &connection).unwrap();
            (old_ids, recent_ids, balance)
        };
        test.queue.enqueue(Job::ScheduleMonthlyReports).unwrap();

        let summary = test.worker.run_until_idle().unwrap();

        assert_eq!(
            summary,
            WorkSummary {
                succeeded: 4,
                retried: 0,
                dropped: 0
            }
        );
        let connection = test.connection.lock().unwrap();
        let reports = get_account_reports(test.fixture.account.id, &connection).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.cutoff_date, months_before(today, 6).unwrap());
        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.email_sent);
        let artifact = get_artifact(report.id, &connection).unwrap();
        assert_eq!(String::from_utf8(artifact.data).unwrap().lines().count(), 6);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        for id in old_ids {
            assert_eq!(
                crate::transaction::get_transaction(id, &connection),
                Err(Error::NotFound)
            );
        }
        for id in recent_ids {
            let transaction = crate::transaction::get_transaction(id, &connection).unwrap();
            assert_eq!(transaction.report_id, None);
        }
        let cutoff: Vec<_> = connection
            .prepare("SELECT amount, kind, date FROM \"transaction\" WHERE cutoff = 1")
            .unwrap()
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, TransactionKind>(1)?,
                    row.get::<_, time::Date>(2)?,
                ))
            })
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(cutoff, vec![(-3_000, TransactionKind::Expense, today)]);
        assert_eq!(count_transactions(&connection), Ok(4));
        assert_eq!(
            get_account_balance(test.fixture.account.id, &connection),
            Ok(balance_before)
        );
    }

    #[test]
    fn account_without_old_transactions_fails_report() {
        let mailer = Arc::new(RecordingMailer::default());
        let test = get_test_worker(mailer.clone());
        let today = ArchiveConfig::default().today().unwrap();
        {
            let connection = test.connection.lock().unwrap();
            insert_transaction(
                &test.fixture.cash,
                TransactionKind::Expense,
                -100,
                today - Duration::days(30),
                &connection,
            );
        }
        test.queue.enqueue(Job::ScheduleMonthlyReports).unwrap();

        let summary = test.worker.run_until_idle().unwrap();

        assert_eq!(summary.succeeded, 2);
        let connection = test.connection.lock().unwrap();
        let reports = get_account_reports(test.fixture.account.id, &connection).unwrap();
        assert_eq!(reports[0].status, ReportStatus::Failed);
        assert_eq!(
            get_artifact(reports[0].id, &connection),
            Err(Error::ArtifactUnavailable(reports[0].id))
        );
        assert_eq!(count_transactions(&connection), Ok(1));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_mail_is_retried_then_dropped() {
        let test = get_test_worker(Arc::new(FailingMailer));
        let today = ArchiveConfig::default().today().unwrap();
        {
            let connection = test.connection.lock().unwrap();
            insert_transaction(
                &test.fixture.cash,
                TransactionKind::Expense,
                -100,
                months_before(today, 8).unwrap(),
                &connection,
            );
        }
        test.queue.enqueue(Job::ScheduleMonthlyReports).unwrap();

        let summary = test.worker.run_until_idle().unwrap();

        assert_eq!(
            summary,
            WorkSummary {
                succeeded: 3,
                retried: MAX_JOB_ATTEMPTS as usize - 1,
                dropped: 1
            }
        );
        let connection = test.connection.lock().unwrap();
        let report = &get_account_reports(test.fixture.account.id, &connection).unwrap()[0];
        // Mail and consolidation are independent, so the report still completes.
        assert_eq!(report.status, ReportStatus::Completed);
        assert!(!report.email_sent);
    }

    #[test]
    fn redelivered_jobs_are_no_ops() {
        let mailer = Arc::new(RecordingMailer::default());
        let test = get_test_worker(mailer.clone());
        let today = ArchiveConfig::default().today().unwrap();
        {
            let connection = test.connection.lock().unwrap();
            insert_transaction(
                &test.fixture.cash,
                TransactionKind::Expense,
                -100,
                months_before(today, 8).unwrap(),
                &connection,
            );
        }
        test.queue.enqueue(Job::ScheduleMonthlyReports).unwrap();
        test.worker.run_until_idle().unwrap();
        let report_id = {
            let connection = test.connection.lock().unwrap();
            get_account_reports(test.fixture.account.id, &connection).unwrap()[0].id
        };

        test.queue.enqueue(Job::ScheduleMonthlyReports).unwrap();
        test.queue.enqueue(Job::GenerateReport(report_id)).unwrap();
        test.queue.enqueue(Job::SendReport(report_id)).unwrap();
        test.queue.enqueue(Job::ConsolidateReport(report_id)).unwrap();
        let summary = test.worker.run_until_idle().unwrap();

        assert_eq!(summary.succeeded, 4);
        assert!(test.queue.is_empty().unwrap());
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
        let connection = test.connection.lock().unwrap();
        assert_eq!(count_transactions(&connection), Ok(1));
    }

    #[test]
    fn enqueue_missing_skips_waiting_jobs() {
        let queue = JobQueue::new();
        queue.enqueue(Job::SendReport(1)).unwrap();

        let added = queue
            .enqueue_missing([Job::SendReport(1), Job::ConsolidateReport(1)])
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(
            queue.pending().unwrap(),
            vec![Job::SendReport(1), Job::ConsolidateReport(1)]
        );
    }

    #[test]
    fn resumes_reports_whose_jobs_were_lost() {
        let test = get_test_worker(Arc::new(RecordingMailer::default()));
        let config = ArchiveConfig::default();
        let cutoff_date = config.cutoff_date(config.today().unwrap()).unwrap();
        let (generated, created) = {
            let connection = test.connection.lock().unwrap();
            let other = create_fixture_with_name("Other", &connection);
            for money_account in [&test.fixture.cash, &other.cash] {
                insert_transaction(
                    money_account,
                    TransactionKind::Expense,
                    -100,
                    months_before(cutoff_date, 1).unwrap(),
                    &connection,
                );
            }
            let report_ids = schedule_monthly_reports(cutoff_date, &connection).unwrap();
            generate_report(report_ids[0], 1000, &connection).unwrap();
            (report_ids[0], report_ids[1])
        };

        let added = test.worker.resume_unfinished_reports().unwrap();

        assert_eq!(added, 3);
        assert_eq!(
            test.queue.pending().unwrap(),
            vec![
                Job::SendReport(generated),
                Job::ConsolidateReport(generated),
                Job::GenerateReport(created),
            ]
        );
        assert_eq!(test.worker.resume_unfinished_reports(), Ok(0));
    }

    #[test]
    fn schedule_after_restart_finishes_stranded_reports() {
        let mailer = Arc::new(RecordingMailer::default());
        let test = get_test_worker(mailer.clone());
        let config = ArchiveConfig::default();
        let cutoff_date = config.cutoff_date(config.today().unwrap()).unwrap();
        let other_account_id = {
            let connection = test.connection.lock().unwrap();
            let other = create_fixture_with_name("Other", &connection);
            for money_account in [&test.fixture.cash, &other.cash] {
                insert_transaction(
                    money_account,
                    TransactionKind::Expense,
                    -100,
                    months_before(cutoff_date, 1).unwrap(),
                    &connection,
                );
            }
            let report_ids = schedule_monthly_reports(cutoff_date, &connection).unwrap();
            generate_report(report_ids[0], 1000, &connection).unwrap();
            other.account.id
        };
        test.queue.enqueue(Job::ScheduleMonthlyReports).unwrap();

        let summary = test.worker.run_until_idle().unwrap();

        assert_eq!(
            summary,
            WorkSummary {
                succeeded: 6,
                retried: 0,
                dropped: 0
            }
        );
        let connection = test.connection.lock().unwrap();
        for account_id in [test.fixture.account.id, other_account_id] {
            let reports = get_account_reports(account_id, &connection).unwrap();
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].status, ReportStatus::Completed);
            assert!(reports[0].email_sent);
        }
        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
    }
}
