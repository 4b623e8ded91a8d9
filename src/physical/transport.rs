//! Row transport: the source and sink interfaces the aggregator runs
//! between, plus in-memory and channel-backed implementations.

use crate::error::{QueryError, Result};
use crate::types::{Row, RowSchema};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};

/// Stream of rows
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Upstream producer of rows
#[async_trait]
pub trait RowSource: Send {
    /// Declared schema of every row this source produces
    fn schema(&self) -> &RowSchema;

    /// Next row, `None` at end of input. An error is terminal.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Terminal marker delivered to a sink after the last row
#[derive(Debug, Clone, Copy)]
pub enum Trailer<'a> {
    Completed,
    Failed(&'a QueryError),
    Cancelled,
}

/// Downstream consumer of rows
#[async_trait]
pub trait RowSink: Send {
    /// Accept one row. May wait for capacity; an error is terminal.
    async fn push(&mut self, row: Row) -> Result<()>;

    /// Receive the terminal marker. Called at most once, and never after
    /// `push` has failed.
    async fn close(&mut self, trailer: Trailer<'_>);
}

/// Owned form of a [`Trailer`], as recorded by sinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    Completed,
    Failed(String),
    Cancelled,
}

impl From<Trailer<'_>> for RunEnd {
    fn from(trailer: Trailer<'_>) -> Self {
        match trailer {
            Trailer::Completed => RunEnd::Completed,
            Trailer::Failed(e) => RunEnd::Failed(e.to_string()),
            Trailer::Cancelled => RunEnd::Cancelled,
        }
    }
}

/// Adapt a row source into a stream of rows
pub fn row_stream<S>(source: S) -> RowStream
where
    S: RowSource + 'static,
{
    stream::unfold(Some(source), |state| async move {
        let mut source = state?;
        match source.next_row().await {
            Ok(Some(row)) => Some((Ok(row), Some(source))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Row source backed by a vector
#[derive(Debug)]
pub struct MemoryRowSource {
    schema: RowSchema,
    rows: VecDeque<Row>,
}

impl MemoryRowSource {
    pub fn new(schema: RowSchema, rows: Vec<Row>) -> Self {
        Self {
            schema,
            rows: rows.into(),
        }
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    fn schema(&self) -> &RowSchema {
        &self.schema
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

/// Row source over any stream of rows
pub struct StreamRowSource {
    schema: RowSchema,
    stream: RowStream,
}

impl StreamRowSource {
    pub fn new<S>(schema: RowSchema, stream: S) -> Self
    where
        S: Stream<Item = Result<Row>> + Send + 'static,
    {
        Self {
            schema,
            stream: stream.boxed(),
        }
    }
}

#[async_trait]
impl RowSource for StreamRowSource {
    fn schema(&self) -> &RowSchema {
        &self.schema
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        self.stream.next().await.transpose()
    }
}

/// Collecting sink that records every row and the trailer
#[derive(Debug, Default)]
pub struct RowBuffer {
    rows: Vec<Row>,
    end: Option<RunEnd>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Trailer received, if the run has closed the sink
    pub fn end(&self) -> Option<&RunEnd> {
        self.end.as_ref()
    }
}

#[async_trait]
impl RowSink for RowBuffer {
    async fn push(&mut self, row: Row) -> Result<()> {
        if self.end.is_some() {
            return Err(QueryError::Sink("row pushed after trailer".to_string()));
        }
        self.rows.push(row);
        Ok(())
    }

    async fn close(&mut self, trailer: Trailer<'_>) {
        self.end = Some(trailer.into());
    }
}

/// Message read from a row channel
#[derive(Debug, Clone, PartialEq)]
pub enum RowMessage {
    Row(Row),
    End(RunEnd),
}

/// Bounded row channel. The sink half waits for capacity, which is how
/// downstream backpressure reaches the aggregator. The trailer travels on a
/// separate oneshot so closing never waits on a full channel.
pub fn row_channel(capacity: usize) -> (ChannelRowSink, RowReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let (end_tx, end_rx) = oneshot::channel();
    (
        ChannelRowSink {
            tx: Some(tx),
            end: Some(end_tx),
        },
        RowReceiver {
            rx,
            end: Some(end_rx),
        },
    )
}

#[derive(Debug)]
pub struct ChannelRowSink {
    tx: Option<mpsc::Sender<Row>>,
    end: Option<oneshot::Sender<RunEnd>>,
}

#[async_trait]
impl RowSink for ChannelRowSink {
    async fn push(&mut self, row: Row) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| QueryError::Sink("row pushed after trailer".to_string()))?;
        tx.send(row)
            .await
            .map_err(|_| QueryError::Sink("row receiver dropped".to_string()))
    }

    async fn close(&mut self, trailer: Trailer<'_>) {
        self.tx = None;
        if let Some(end) = self.end.take() {
            // A dropped receiver has nobody left to tell.
            let _ = end.send(trailer.into());
        }
    }
}

#[derive(Debug)]
pub struct RowReceiver {
    rx: mpsc::Receiver<Row>,
    end: Option<oneshot::Receiver<RunEnd>>,
}

impl RowReceiver {
    /// Next row, then the trailer once every row has been read. `None`
    /// after the trailer, or if the sink was dropped without one.
    pub async fn recv(&mut self) -> Option<RowMessage> {
        if let Some(row) = self.rx.recv().await {
            return Some(RowMessage::Row(row));
        }
        let end = self.end.take()?;
        end.await.ok().map(RowMessage::End)
    }

    /// Read until the trailer, returning the rows and how the run ended.
    pub async fn collect(mut self) -> (Vec<Row>, Option<RunEnd>) {
        let mut rows = Vec::new();
        while let Some(msg) = self.recv().await {
            match msg {
                RowMessage::Row(row) => rows.push(row),
                RowMessage::End(end) => return (rows, Some(end)),
            }
        }
        (rows, None)
    }
}

/// Bounded input channel: rows or an upstream error are sent in, and the
/// receiving half is a [`RowSource`].
pub fn source_channel(schema: RowSchema, capacity: usize) -> (RowSender, ChannelRowSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (RowSender { tx }, ChannelRowSource { schema, rx })
}

#[derive(Debug, Clone)]
pub struct RowSender {
    tx: mpsc::Sender<Result<Row>>,
}

impl RowSender {
    pub async fn send(&self, row: Row) -> Result<()> {
        self.tx
            .send(Ok(row))
            .await
            .map_err(|_| QueryError::Upstream("row source dropped".to_string()))
    }

    /// Fail the stream; the consumer sees `err` from its next read.
    pub async fn fail(&self, err: QueryError) -> Result<()> {
        self.tx
            .send(Err(err))
            .await
            .map_err(|_| QueryError::Upstream("row source dropped".to_string()))
    }
}

/// Receiving half of [`source_channel`]. End of input is signalled by
/// dropping every [`RowSender`].
#[derive(Debug)]
pub struct ChannelRowSource {
    schema: RowSchema,
    rx: mpsc::Receiver<Result<Row>>,
}

#[async_trait]
impl RowSource for ChannelRowSource {
    fn schema(&self) -> &RowSchema {
        &self.schema
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        self.rx.recv().await.transpose()
    }
}
