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

use futures::{stream, Stream};
use tokio::sync::mpsc;

/// Collect $take items from an mpsc/broadcast receiver or panic after $timeout.
#[macro_export]
macro_rules! collect_recv {
    ($rx:expr, take=$take:expr, timeout=$timeout:expr $(,)?) => {{
        use tokio::time;

        // Evaluate $rx once, NOT in the loop
        let rx = &mut $rx;

        let mut items = Vec::new();
        loop {
            let item = time::timeout($timeout, rx.recv()).await.expect(&format!(
                "Timeout before receiver could collect {} item(s). Got {} item(s).",
                $take,
                items.len()
            ));

            items.push(item.expect(&format!("{}/{} recv ended early", items.len(), $take)));
            if items.len() == $take {
                break items;
            }
        }
    }};
}

pub fn convert_mpsc_to_stream<T>(rx: &mut mpsc::Receiver<T>) -> impl Stream<Item = T> + '_ {
    stream::unfold(rx, |rx| async move { rx.recv().await.map(|t| (t, rx)) })
}
