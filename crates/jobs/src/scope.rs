use crate::system::{Context, JobArgs, JobSystem, Task, for_each_group, run_group};
use crate::{JobResult, WaitError};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Borrowing job scope created by [`JobSystem::scope`].
///
/// Jobs spawned here may borrow from the enclosing stack frame; the scope
/// waits for all of them before returning.
pub struct Scope<'scope, 'env: 'scope> {
    system: &'scope JobSystem,
    context: Context,
    _scope: PhantomData<&'scope mut &'scope ()>,
    _env: PhantomData<&'env mut &'env ()>,
}

impl JobSystem {
    /// Run `f` with a [`Scope`] and wait for every job it spawned.
    ///
    /// A panic inside `f` is resumed after the spawned jobs have finished.
    pub fn scope<'env, F, R>(&self, f: F) -> Result<R, WaitError>
    where
        F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
    {
        let scope = Scope {
            system: self,
            context: Context::new(),
            _scope: PhantomData,
            _env: PhantomData,
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(&scope)));
        let waited = self.wait(&scope.context);
        match result {
            Err(payload) => panic::resume_unwind(payload),
            Ok(value) => waited.map(|_| value),
        }
    }
}

impl<'scope, 'env> Scope<'scope, 'env> {
    pub fn context(&self) -> &Context {
        &self.context
    }

    fn spawn_task(&self, task: Box<dyn FnOnce() -> JobResult + Send + 'scope>) {
        // SAFETY: only the lifetime is erased. `JobSystem::scope` waits on
        // `self.context` on every exit path, including a panicking body,
        // so the task ends before anything it borrows for 'scope is dropped.
        let task: Task = unsafe {
            std::mem::transmute::<Box<dyn FnOnce() -> JobResult + Send + 'scope>, Task>(task)
        };
        self.system.submit(&self.context.state, task);
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce(JobArgs) -> JobResult + Send + 'scope,
    {
        self.spawn_task(Box::new(move || f(JobArgs::single())));
    }

    pub fn dispatch<F>(&self, job_count: u32, group_size: u32, f: F)
    where
        F: Fn(JobArgs) -> JobResult + Send + Sync + 'scope,
    {
        let f = Arc::new(f);
        for_each_group(job_count, group_size, |group_id, group_size| {
            let f = Arc::clone(&f);
            let state = Arc::clone(&self.context.state);
            self.spawn_task(Box::new(move || {
                run_group(&*f, &state, group_id, group_size, job_count)
            }));
        });
    }

    /// Mutate every element of `items` in parallel, `group_size` elements
    /// per job.
    pub fn for_each_mut<T, F>(&self, items: &'scope mut [T], group_size: usize, f: F)
    where
        T: Send + 'scope,
        F: Fn(JobArgs, &mut T) -> JobResult + Send + Sync + 'scope,
    {
        let group_size = group_size.max(1);
        let f = Arc::new(f);
        for (group_id, chunk) in items.chunks_mut(group_size).enumerate() {
            let f = Arc::clone(&f);
            let state = Arc::clone(&self.context.state);
            self.spawn_task(Box::new(move || {
                let last = chunk.len().saturating_sub(1);
                for (i, item) in chunk.iter_mut().enumerate() {
                    if state.is_cancelled() {
                        break;
                    }
                    let args = JobArgs {
                        job_index: (group_id * group_size + i) as u32,
                        group_id: group_id as u32,
                        group_index: i as u32,
                        is_first_job_in_group: i == 0,
                        is_last_job_in_group: i == last,
                    };
                    f(args, item)?;
                }
                Ok(())
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{JobError, JobSystemConfig};

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    fn pool() -> JobSystem {
        JobSystem::new(JobSystemConfig {
            thread_count: Some(3),
        })
        .unwrap()
    }

    #[test]
    fn for_each_mut_touches_every_element() {
        let jobs = pool();
        let mut values: Vec<u64> = (0..500).collect();
        jobs.scope(|s| {
            s.for_each_mut(&mut values, 32, |args, v| {
                *v = *v * 2 + u64::from(args.job_index == 0);
                Ok(())
            });
        })
        .unwrap();
        assert_eq!(values[0], 1);
        assert!(values.iter().enumerate().skip(1).all(|(i, v)| *v == i as u64 * 2));
    }

    #[test]
    fn scoped_jobs_borrow_the_stack() {
        let jobs = pool();
        let input: Vec<u64> = (1..=100).collect();
        let sum = AtomicU64::new(0);
        jobs.scope(|s| {
            s.dispatch(input.len() as u32, 10, |args| {
                sum.fetch_add(input[args.job_index as usize], Ordering::Relaxed);
                Ok(())
            });
            s.execute(|_| {
                sum.fetch_add(1000, Ordering::Relaxed);
                Ok(())
            });
        })
        .unwrap();
        assert_eq!(sum.load(Ordering::Relaxed), 5050 + 1000);
    }

    #[test]
    fn scope_returns_body_value_and_errors() {
        let jobs = pool();
        assert_eq!(jobs.scope(|_| 7).unwrap(), 7);

        let err = jobs
            .scope(|s| s.execute(|_| Err(JobError::msg("nope"))))
            .unwrap_err();
        assert_eq!(err.errors, vec![JobError::msg("nope")]);
    }

    fn fail() {
        panic!("body failed");
    }

    #[test]
    fn panicking_body_still_waits_for_spawned_jobs() {
        let jobs = pool();
        let finished = AtomicBool::new(false);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            jobs.scope(|s| {
                s.execute(|_| {
                    std::thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::SeqCst);
                    Ok(())
                });
                fail();
            })
        }));
        assert!(outcome.is_err());
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn inline_scope_works() {
        let jobs = JobSystem::inline();
        let mut values = vec![1u32; 16];
        jobs.scope(|s| {
            s.for_each_mut(&mut values, 4, |_, v| {
                *v += 1;
                Ok(())
            });
        })
        .unwrap();
        assert!(values.iter().all(|v| *v == 2));
    }
}
