// Copyright 2024. The Anycall Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

/// Re-evaluate an expression until it equals the expected value, sleeping
/// `interval` between attempts, and panic once the attempts are used up.
/// Sleeps with `tokio::time::sleep`, so it must run in an async context; the
/// checked expression may itself contain `.await`s.
///
/// ```nocompile
/// async_assert_eventually!(
///     pool.count_live_sessions(),
///     expect = 2,
///     max_attempts = 20,
///     interval = Duration::from_millis(250)
/// );
/// ```
#[macro_export]
macro_rules! async_assert_eventually {
    ($probe:expr, expect = $expected:expr, max_attempts = $max_attempts:expr, interval = $interval:expr $(,)?) => {{
        let expected = $expected;
        let mut attempts_left: usize = $max_attempts;
        while $probe != expected {
            if attempts_left == 0 {
                panic!(
                    "async_assert_eventually!({}) did not reach `{:?}` within {} attempts",
                    stringify!($probe),
                    expected,
                    $max_attempts,
                );
            }
            attempts_left -= 1;
            tokio::time::sleep($interval).await;
        }
    }};

    ($probe:expr, expect = $expected:expr $(,)?) => {{
        $crate::async_assert_eventually!(
            $probe,
            expect = $expected,
            max_attempts = 10,
            interval = std::time::Duration::from_millis(100)
        );
    }};
}
