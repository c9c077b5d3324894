//! The `Senders` stage: recovers the ECDSA signer of every transaction in the
//! canonical range up to the `BlockHashes` watermark, writing one
//! `concat(Address[20])` row per block into `Senders`.
//!
//! Recovery is CPU-bound and embarrassingly parallel across transactions, so
//! this module also owns a small worker farm (see [`farm`]) that fans
//! decoded transactions out across a bounded thread pool and reassembles
//! recovered addresses back into their original block order.

use esync_config::{EtlConfig, SenderRecoveryConfig};
use esync_db_api::{
    BlockBodies, BlockBodyKey, BlockNumberKey, CanonicalHashes, Database, DbCursorRO, DbCursorRW, DbTx, DbTxMut, Senders as SendersTable,
};
use esync_etl::{Collector, LoadMode};
use esync_primitives::{decode_canonical_transactions, BlockNumber, ChainConfig, StageId, B256};
use esync_stages_api::{ExecInput, ExecOutput, PruneInput, PruneOutput, Stage, StageContext, StageError, UnwindInput, UnwindOutput};

mod farm;

use farm::{RecoveryFarm, RecoveryPackage};

/// Recovers and persists transaction senders over the range `BlockHashes`
/// has already made canonical.
#[derive(Debug)]
pub struct SendersStage {
    etl: EtlConfig,
    recovery: SenderRecoveryConfig,
    chain: ChainConfig,
}

impl SendersStage {
    /// Builds the stage against a fixed fork-activation schedule.
    #[must_use]
    pub fn new(etl: EtlConfig, recovery: SenderRecoveryConfig, chain: ChainConfig) -> Self {
        Self { etl, recovery, chain }
    }

    /// Decodes one block's transactions into [`RecoveryPackage`]s, validating
    /// everything the farm itself does not (chain id, fork activation, and the
    /// EIP-2 low-`s` rule) before a single package reaches a worker.
    fn build_packages(&self, block: BlockNumber, body: &[u8]) -> Result<Vec<RecoveryPackage>, StageError> {
        let txns = decode_canonical_transactions(body).map_err(|e| StageError::DecodingError(e.to_string()))?;
        let mut out = Vec::with_capacity(txns.len());
        for txn in txns {
            if !txn.signature.is_low_s() {
                return Err(StageError::InvalidTransaction);
            }
            match &txn.transaction {
                esync_primitives::TxEnvelope::Legacy(tx) => {
                    if let Some(chain_id) = tx.chain_id {
                        if chain_id != self.chain.chain_id {
                            return Err(StageError::UnknownChainId);
                        }
                    }
                }
                esync_primitives::TxEnvelope::Eip2930(tx) => {
                    if tx.chain_id != self.chain.chain_id {
                        return Err(StageError::UnknownChainId);
                    }
                    if !self.chain.berlin_block.is_some_and(|b| block >= b) {
                        return Err(StageError::InvalidBlock);
                    }
                }
                esync_primitives::TxEnvelope::Eip1559(tx) => {
                    if tx.chain_id != self.chain.chain_id {
                        return Err(StageError::UnknownChainId);
                    }
                    if !self.chain.london_block.is_some_and(|b| block >= b) {
                        return Err(StageError::InvalidBlock);
                    }
                }
            }
            out.push(RecoveryPackage { block, signing_hash: txn.transaction.signing_hash(), signature: txn.signature });
        }
        Ok(out)
    }
}

/// A view of `BlockBodies` keyed only by block number, used to look up a
/// block's body once its canonical hash is already known.
fn body_key(hash: B256, number: BlockNumber) -> BlockBodyKey {
    BlockBodyKey { number, hash }
}

impl<DB: Database> Stage<DB> for SendersStage {
    fn id(&self) -> StageId {
        StageId::Senders
    }

    fn forward(&mut self, tx: DB::TxMut<'_>, ctx: &StageContext<'_>, input: ExecInput) -> Result<ExecOutput, StageError> {
        let target = input.target.ok_or(StageError::InvalidProgress)?;
        if input.checkpoint == target {
            return Ok(ExecOutput::done(input.checkpoint));
        }
        if target < input.checkpoint {
            return Err(StageError::InvalidProgress);
        }

        let max_workers = self.recovery.max_workers.unwrap_or_else(num_cpus::get).max(1);
        let mut farm = RecoveryFarm::new(max_workers, ctx.stop.clone());
        let mut collector = Collector::new(&self.etl)?;

        let result = self.run_recovery(&tx, input.checkpoint, target, &mut farm, &mut collector);
        // The farm is dropped regardless of outcome, which stops every worker
        // thread and joins them before this call returns.
        drop(farm);
        result?;

        let destination_empty = tx.cursor_read::<SendersTable>()?.first()?.is_none();
        let mode = if destination_empty { LoadMode::Append } else { LoadMode::Upsert };
        {
            let mut dest = tx.cursor_write::<SendersTable>()?;
            collector.load(&mut dest, mode, self.etl.log_every_percent, |key, value| {
                let number = esync_primitives::decode_block_number_key(&key).expect("encoded by this stage as BlockNumberKey::encode");
                Ok(Some((BlockNumberKey(number), value)))
            })?;
        }

        ctx.registry.put_progress(&tx, StageId::Senders, target)?;
        tx.commit()?;
        Ok(ExecOutput::done(target))
    }

    fn unwind(&mut self, tx: DB::TxMut<'_>, ctx: &StageContext<'_>, input: UnwindInput) -> Result<UnwindOutput, StageError> {
        if input.checkpoint <= input.unwind_to {
            return Ok(UnwindOutput { checkpoint: input.unwind_to });
        }

        {
            let mut dest = tx.cursor_write::<SendersTable>()?;
            let mut entry = dest.seek(&BlockNumberKey(input.unwind_to + 1))?;
            while let Some((key, _)) = entry {
                if key.0 > input.checkpoint {
                    break;
                }
                dest.delete_current()?;
                entry = dest.next()?;
            }
        }

        ctx.registry.put_progress(&tx, StageId::Senders, input.unwind_to)?;
        tx.commit()?;
        Ok(UnwindOutput { checkpoint: input.unwind_to })
    }

    fn prune(&mut self, _tx: DB::TxMut<'_>, _ctx: &StageContext<'_>, input: PruneInput) -> Result<PruneOutput, StageError> {
        Ok(PruneOutput::unimplemented(input))
    }
}

impl SendersStage {
    /// The producer side of recovery: walks `CanonicalHashes`/`BlockBodies` in
    /// block order, decodes and validates each block's transactions, and hands
    /// batches to `farm`, accumulating recovered addresses into `collector` one
    /// block at a time as results come back in order.
    ///
    /// Does not commit or write the watermark; that is `forward`'s job once this
    /// returns successfully. Returning early on any error (including
    /// `aborted`) leaves `collector` holding only whatever was already
    /// flushed, which `forward` discards by propagating the error before ever
    /// calling `collector.load`.
    fn run_recovery<Tx: DbTxMut>(
        &self,
        tx: &Tx,
        checkpoint: BlockNumber,
        target: BlockNumber,
        farm: &mut RecoveryFarm,
        collector: &mut Collector,
    ) -> Result<(), StageError> {
        let batch_size = self.recovery.batch_size.max(1);
        let mut pending: Vec<RecoveryPackage> = Vec::with_capacity(batch_size);
        let mut current_block: Option<(BlockNumber, Vec<u8>)> = None;

        let mut hashes = tx.cursor_read::<CanonicalHashes>()?;
        let mut entry = hashes.seek(&BlockNumberKey(checkpoint + 1))?;
        let mut height = checkpoint + 1;
        while height <= target {
            if farm.stop().is_set() {
                return Err(StageError::Aborted);
            }
            let Some((key, hash)) = entry else {
                return Err(StageError::MissingSenders);
            };
            if key.0 != height {
                return Err(StageError::MissingSenders);
            }
            let body = tx
                .get::<BlockBodies>(&body_key(hash, height))?
                .ok_or(StageError::MissingSenders)?;

            let packages = self.build_packages(height, &body)?;
            for package in packages {
                pending.push(package);
                if pending.len() >= batch_size {
                    let batch = std::mem::replace(&mut pending, Vec::with_capacity(batch_size));
                    farm.dispatch(batch)?;
                    self.drain_ready(farm, collector, &mut current_block)?;
                }
            }

            height += 1;
            entry = if height <= target { hashes.next()? } else { None };
        }

        if !pending.is_empty() {
            farm.dispatch(pending)?;
        }
        farm.wait_until_idle();
        self.drain_ready(farm, collector, &mut current_block)?;

        if let Some((number, addresses)) = current_block.take() {
            collector.collect(esync_primitives::block_number_key(number).to_vec(), addresses)?;
        }
        Ok(())
    }

    /// Pulls every harvested, in-order result off `farm` and folds its
    /// `(block, address)` pairs into `current_block`, flushing to `collector`
    /// whenever the block number changes.
    fn drain_ready(&self, farm: &mut RecoveryFarm, collector: &mut Collector, current_block: &mut Option<(BlockNumber, Vec<u8>)>) -> Result<(), StageError> {
        for (block, address) in farm.harvest_in_order()? {
            match current_block {
                Some((number, addresses)) if *number == block => addresses.extend_from_slice(address.as_slice()),
                _ => {
                    if let Some((number, addresses)) = current_block.take() {
                        collector.collect(esync_primitives::block_number_key(number).to_vec(), addresses)?;
                    }
                    let mut addresses = Vec::with_capacity(20);
                    addresses.extend_from_slice(address.as_slice());
                    *current_block = Some((block, addresses));
                }
            }
        }
        Ok(())
    }
}
