use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;
use url::Url;

/// Requests the report for `query` once, returning whether the server answered with success.
async fn request_report(client: &reqwest::Client, url: &Url) -> bool {
    match client.get(url.clone()).send().await {
        Ok(response) if response.status().is_success() => response.bytes().await.is_ok(),
        Ok(response) => {
            tracing::debug!(status = %response.status(), "Request failed");
            false
        }
        Err(err) => {
            let stderr: &dyn std::error::Error = &err;
            tracing::debug!(stderr, "Request failed");
            false
        }
    }
}

pub async fn perform_stresstest(
    client: reqwest::Client,
    base_url: Url,
    queries: Vec<String>,
    concurrency: usize,
    duration: Duration,
) -> Result<()> {
    let workloads = queries
        .iter()
        .map(|query| {
            let mut url = base_url.clone();
            url.query_pairs_mut().append_pair("q", query);
            (query.clone(), Arc::new(url))
        })
        .collect::<Vec<_>>();

    // warmup: request each query once, so the store is filled
    {
        let start = Instant::now();

        let futures = workloads
            .iter()
            .map(|(_, url)| request_report(&client, url));
        let results = futures::future::join_all(futures).await;
        anyhow::ensure!(
            results.iter().any(|ok| *ok),
            "warmup failed, is weathercache running at {base_url}?"
        );

        println!("Warmup: {:?}", start.elapsed());
    };
    println!();

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for (query, url) in workloads.into_iter() {
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start + duration);
        let client = client.clone();

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let failures = Arc::new(AtomicUsize::new(0));
            let semaphore = Arc::new(Semaphore::new(concurrency));

            // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            loop {
                if deadline.elapsed() > Duration::ZERO {
                    break;
                }
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        let client = client.clone();
                        let url = Arc::clone(&url);
                        let task_durations = Arc::clone(&task_durations);
                        let failures = Arc::clone(&failures);
                        let task_start = Instant::now();

                        tokio::spawn(async move {
                            if request_report(&client, &url).await {
                                let elapsed = task_start.elapsed().as_secs_f64();
                                task_durations.lock().unwrap().add(elapsed);
                            } else {
                                failures.fetch_add(1, Ordering::Relaxed);
                            }

                            drop(permit);
                        });
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;

            let task_durations: DDSketch = {
                let mut task_durations = task_durations.lock().unwrap();
                std::mem::take(&mut task_durations)
            };

            (query, task_durations, failures.load(Ordering::Relaxed))
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for task in finished_tasks {
        let (query, task_durations, failures) = task.context("stresstest task panicked")?;

        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        println!(
            "{query} (concurrency: {concurrency}): {ops} operations, {ops_ps:.2} ops/s, {failures} failures"
        );
        if ops == 0 {
            continue;
        }

        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let quantile = |q| {
            let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let (p50, p90, p99) = (quantile(0.5), quantile(0.9), quantile(0.99));
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
    }

    Ok(())
}
