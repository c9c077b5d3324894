//! The `BlockHashes` stage: maintains the inverse index
//! `HeaderNumbers: HeaderHash -> BlockNum_BE` derived from
//! `CanonicalHashes: BlockNum_BE -> HeaderHash`.

use esync_config::EtlConfig;
use esync_db_api::{BlockNumberKey, CanonicalHashes, Database, DbCursorRO, DbCursorRW, DbTx, DbTxMut, HeaderNumbers, Key, Table};
use esync_etl::{Collector, LoadMode};
use esync_primitives::{BlockNumber, StageId, B256};
use esync_stages_api::{ExecInput, ExecOutput, PruneInput, PruneOutput, Stage, StageContext, StageError, UnwindInput, UnwindOutput};

/// A view of the `CanonicalHashes` table that decodes its value as raw bytes
/// instead of a strict [`B256`], so this stage can detect and report a
/// malformed (non-32-byte) hash itself as `bad_block_hash` rather than have the
/// backend's codec reject it as an opaque decode error.
#[derive(Debug)]
struct CanonicalHashesRaw;

impl Table for CanonicalHashesRaw {
    const NAME: &'static str = CanonicalHashes::NAME;
    type Key = BlockNumberKey;
    type Value = Vec<u8>;
}

/// Derives `HeaderNumbers` from `CanonicalHashes` over the range the `Bodies`
/// watermark has made available.
#[derive(Debug)]
pub struct BlockHashesStage {
    etl: EtlConfig,
}

impl BlockHashesStage {
    /// Builds the stage with the given Collector configuration.
    #[must_use]
    pub fn new(etl: EtlConfig) -> Self {
        Self { etl }
    }
}

impl<DB: Database> Stage<DB> for BlockHashesStage {
    fn id(&self) -> StageId {
        StageId::BlockHashes
    }

    fn forward(&mut self, tx: DB::TxMut<'_>, ctx: &StageContext<'_>, input: ExecInput) -> Result<ExecOutput, StageError> {
        let target = input.target.ok_or(StageError::InvalidProgress)?;
        if input.checkpoint == target {
            return Ok(ExecOutput::done(input.checkpoint));
        }
        if target < input.checkpoint {
            return Err(StageError::InvalidProgress);
        }

        let mut collector = Collector::new(&self.etl)?;
        {
            let mut source = tx.cursor_read::<CanonicalHashesRaw>()?;
            let mut expected: BlockNumber = input.checkpoint + 1;
            let mut entry = source.seek(&BlockNumberKey(expected))?;
            let mut last_seen: Option<BlockNumber> = None;
            // Bound the scan at `target`: `CanonicalHashes` may already hold entries
            // beyond it, written by the upstream download subsystem ahead of `Bodies`.
            while expected <= target {
                let Some((key, hash_bytes)) = entry else {
                    break;
                };
                if key.0 != expected {
                    return Err(StageError::BadChainSequence);
                }
                if hash_bytes.len() != 32 {
                    return Err(StageError::BadBlockHash);
                }
                collector.collect(hash_bytes, key.encode())?;
                last_seen = Some(expected);
                expected += 1;
                entry = if expected <= target { source.next()? } else { None };
            }
            if last_seen != Some(target) {
                return Err(StageError::BadChainSequence);
            }
        }

        let destination_empty = tx.cursor_read::<HeaderNumbers>()?.first()?.is_none();
        let mode = if destination_empty { LoadMode::Append } else { LoadMode::Upsert };
        {
            let mut dest = tx.cursor_write::<HeaderNumbers>()?;
            // `key`/`value` are exactly the 32-byte hash and 8-byte block-number
            // encoding this stage itself collected above.
            collector.load(&mut dest, mode, self.etl.log_every_percent, |key, value| {
                let hash = B256::from_slice(&key);
                let number = esync_primitives::decode_block_number_key(&value).expect("encoded by this stage as BlockNumberKey::encode");
                Ok(Some((hash, number)))
            })?;
        }

        ctx.registry.put_progress(&tx, StageId::BlockHashes, target)?;
        tx.commit()?;
        Ok(ExecOutput::done(target))
    }

    fn unwind(&mut self, tx: DB::TxMut<'_>, ctx: &StageContext<'_>, input: UnwindInput) -> Result<UnwindOutput, StageError> {
        if input.checkpoint <= input.unwind_to {
            return Ok(UnwindOutput { checkpoint: input.unwind_to });
        }

        {
            let mut source = tx.cursor_read::<CanonicalHashesRaw>()?;
            let mut dest = tx.cursor_write::<HeaderNumbers>()?;
            let mut height = input.unwind_to + 1;
            let mut entry = source.seek(&BlockNumberKey(height))?;
            while height <= input.checkpoint {
                let Some((_, hash_bytes)) = entry else {
                    break;
                };
                if hash_bytes.len() == 32 {
                    let hash = B256::from_slice(&hash_bytes);
                    if dest.seek_exact(&hash)?.is_some() {
                        dest.delete_current()?;
                    } else {
                        tracing::debug!(?hash, "HeaderNumbers entry already absent during unwind");
                    }
                }
                height += 1;
                entry = if height <= input.checkpoint { source.next()? } else { None };
            }
        }

        ctx.registry.put_progress(&tx, StageId::BlockHashes, input.unwind_to)?;
        tx.commit()?;
        Ok(UnwindOutput { checkpoint: input.unwind_to })
    }

    fn prune(&mut self, _tx: DB::TxMut<'_>, _ctx: &StageContext<'_>, input: PruneInput) -> Result<PruneOutput, StageError> {
        // The index is tiny compared to the tables it derives from; kept for
        // the full height range instead of pruned.
        Ok(PruneOutput::unimplemented(input))
    }
}
