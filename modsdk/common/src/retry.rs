//! Tick-driven bounded retries.
//!
//! The host drives time (one `tick` per frame); nothing here sleeps.

/// What happened when a scheduled action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Done,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Seconds before the first attempt.
    pub initial_delay: f32,
    /// Seconds between blocked attempts.
    pub retry_delay: f32,
    /// Blocked attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: 10.0,
            retry_delay: 5.0,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finished<T> {
    Completed(T),
    GaveUp(T),
}

struct Job<T> {
    subject: T,
    policy: RetryPolicy,
    remaining: f32,
    blocked: u32,
}

pub struct RetryScheduler<T> {
    jobs: Vec<Job<T>>,
}

impl<T> RetryScheduler<T> {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn schedule(&mut self, subject: T, policy: RetryPolicy) {
        self.jobs.push(Job {
            subject,
            remaining: policy.initial_delay,
            policy,
            blocked: 0,
        });
    }

    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Advances every job by `dt` seconds, running `action` on the ones that
    /// came due. Returns jobs that finished during this tick.
    pub fn tick<F>(&mut self, dt: f32, mut action: F) -> Vec<Finished<T>>
    where
        F: FnMut(&T) -> Attempt,
    {
        let mut finished = Vec::new();
        let mut waiting = Vec::with_capacity(self.jobs.len());

        for mut job in self.jobs.drain(..) {
            job.remaining -= dt;
            if job.remaining > 0.0 {
                waiting.push(job);
                continue;
            }

            match action(&job.subject) {
                Attempt::Done => finished.push(Finished::Completed(job.subject)),
                Attempt::Blocked => {
                    job.blocked += 1;
                    if job.blocked >= job.policy.max_attempts {
                        finished.push(Finished::GaveUp(job.subject));
                    } else {
                        job.remaining = job.policy.retry_delay;
                        waiting.push(job);
                    }
                }
            }
        }

        self.jobs = waiting;
        finished
    }
}

impl<T> Default for RetryScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
