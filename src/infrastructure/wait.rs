//! Bounded polling
//!
//! [`poll_until`] is the single wait primitive: the outcome classifier's
//! search loop and every "wait for element" helper are built on it.

use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::{Instant, sleep};

use super::browser_driver::{BrowserSession, DriverError, DriverResult, ElementRef, Locator, best_effort};

/// Checks `state` every `interval` until the check yields a value or
/// `timeout` elapses. The check always runs at least once, and once more at
/// the deadline. Errors from the check end the wait immediately.
pub async fn poll_until<S, T, E, F>(
    state: &mut S,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<Option<T>, E>
where
    S: ?Sized + Send,
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<Option<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(found) = check(state).await? {
            return Ok(Some(found));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Swallows lookup noise while polling; only a dead session aborts the wait.
fn tolerate<T>(result: DriverResult<Option<T>>) -> DriverResult<Option<T>> {
    best_effort(result)
}

/// Waits for a displayed element matching `locator`.
pub async fn find_visible<S>(
    session: &mut S,
    locator: Locator,
    timeout: Duration,
    interval: Duration,
) -> DriverResult<Option<ElementRef>>
where
    S: BrowserSession + ?Sized,
{
    poll_until(session, timeout, interval, move |s| {
        async move { tolerate(s.find_displayed(locator).await) }.boxed()
    })
    .await
}

/// Waits for a displayed element whose trimmed text is not empty.
pub async fn wait_text_not_empty<S>(
    session: &mut S,
    locator: Locator,
    timeout: Duration,
    interval: Duration,
) -> DriverResult<Option<String>>
where
    S: BrowserSession + ?Sized,
{
    poll_until(session, timeout, interval, move |s| {
        async move {
            let attempt = async {
                let Some(el) = s.find_displayed(locator).await? else {
                    return Ok(None);
                };
                let text = s.read_text(&el).await?;
                let text = text.trim();
                Ok::<_, DriverError>((!text.is_empty()).then(|| text.to_string()))
            };
            tolerate(attempt.await)
        }
        .boxed()
    })
    .await
}

/// Waits until nothing matching `locator` is displayed. Returns `false` on timeout.
pub async fn wait_invisible<S>(
    session: &mut S,
    locator: Locator,
    timeout: Duration,
    interval: Duration,
) -> DriverResult<bool>
where
    S: BrowserSession + ?Sized,
{
    let gone = poll_until(session, timeout, interval, move |s| {
        async move {
            match s.find_displayed(locator).await {
                Ok(None) => Ok(Some(())),
                Ok(Some(_)) => Ok(None),
                Err(e) if e.is_session_invalid() => Err(e),
                // the element went stale while we looked at it
                Err(_) => Ok(Some(())),
            }
        }
        .boxed()
    })
    .await?;
    Ok(gone.is_some())
}

/// Waits for `locator` to be displayed, then clicks it.
pub async fn click_when_ready<S>(
    session: &mut S,
    locator: Locator,
    timeout: Duration,
    interval: Duration,
) -> DriverResult<()>
where
    S: BrowserSession + ?Sized,
{
    let element = find_visible(session, locator, timeout, interval)
        .await?
        .ok_or_else(|| DriverError::Timeout(format!("timed out waiting for {locator}")))?;
    session.click(&element).await
}

/// Waits for `locator` to be displayed, clears it and types `text`.
pub async fn type_when_ready<S>(
    session: &mut S,
    locator: Locator,
    text: &str,
    timeout: Duration,
    interval: Duration,
) -> DriverResult<()>
where
    S: BrowserSession + ?Sized,
{
    let element = find_visible(session, locator, timeout, interval)
        .await?
        .ok_or_else(|| DriverError::Timeout(format!("timed out waiting for {locator}")))?;
    session.clear(&element).await?;
    session.type_text(&element, text).await
}

/// Immediate check: is any of `locators` displayed right now?
pub async fn any_displayed<S>(session: &mut S, locators: &[Locator]) -> DriverResult<bool>
where
    S: BrowserSession + ?Sized,
{
    for locator in locators {
        if tolerate(session.find_displayed(*locator).await)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_first_value_the_check_yields() {
        let mut ticks = 0u32;
        let found: Result<Option<u32>, ()> = poll_until(
            &mut ticks,
            Duration::from_secs(1),
            Duration::from_millis(5),
            |t| {
                async move {
                    *t += 1;
                    Ok((*t == 3).then_some(*t))
                }
                .boxed()
            },
        )
        .await;
        assert_eq!(found, Ok(Some(3)));
    }

    #[tokio::test]
    async fn times_out_with_none_after_a_final_check() {
        let mut ticks = 0u32;
        let started = Instant::now();
        let found: Result<Option<()>, ()> = poll_until(
            &mut ticks,
            Duration::from_millis(60),
            Duration::from_millis(20),
            |t| {
                async move {
                    *t += 1;
                    Ok(None)
                }
                .boxed()
            },
        )
        .await;
        assert_eq!(found, Ok(None));
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(ticks >= 2);
    }

    #[tokio::test]
    async fn check_errors_end_the_wait() {
        let mut state = ();
        let result: Result<Option<()>, &str> = poll_until(
            &mut state,
            Duration::from_secs(5),
            Duration::from_millis(5),
            |_| async { Err("boom") }.boxed(),
        )
        .await;
        assert_eq!(result, Err("boom"));
    }
}
