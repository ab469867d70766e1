/**
 * CfpRec
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::sync::mpsc;
use std::time::Duration;

use scoped_pool::Pool;

pub fn to_millis(duration: Duration) -> u64 {
    (duration.as_secs() * 1_000) + (duration.subsec_nanos() / 1_000_000) as u64
}

/// One worker less than the number of CPUs, so the driving thread keeps a core, but at least one.
pub fn default_pool_size() -> usize {
    std::cmp::max(num_cpus::get().saturating_sub(1), 1)
}

/// Runs `job` once per task on the pool and blocks until all of them have finished. Every job
/// sends its result back over a channel, so the results arrive in no particular order and are
/// merged on the calling thread after the barrier.
pub fn scatter_gather<T, R, F>(pool: &Pool, tasks: &[T], job: F) -> Vec<R>
    where T: Sync, R: Send, F: Fn(&T) -> R + Sync {

    let (sender, receiver) = mpsc::channel();

    pool.scoped(|scope| {
        for task in tasks.iter() {
            let sender = sender.clone();
            let job = &job;

            scope.execute(move || {
                // The receiver lives until after the scope has joined.
                let _ = sender.send(job(task));
            });
        }
    });

    drop(sender);

    receiver.into_iter().collect()
}
