//! 协议步骤标注
//!
//! 每个声明的步骤贪心吞掉紧随其后的同方向包，作为该步骤的分片。

use super::meta::{PacketDir, PacketTxRx};
use super::sequence::SequenceStep;
use crate::error::PacketError;
use serde::{Deserialize, Serialize};

/// 标注结果：一个协议步骤及其分片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub step: String,
    pub dir: PacketDir,
    pub fragments: Vec<PacketTxRx>,
}

/// 用声明的序列解释整条包轨迹。
///
/// 可缺省步骤方向不符时记为零分片，不消耗包；必需步骤方向不符则失败。
/// 所有步骤处理完后仍有剩余包也视为失败。
pub fn label_steps(
    seq: &[SequenceStep],
    pkts: &[PacketTxRx],
) -> Result<Vec<ProtocolStep>, PacketError> {
    let mut i = 0;
    let mut steps = Vec::with_capacity(seq.len());

    for decl in seq {
        let start = i;
        while pkts.get(i).is_some_and(|p| p.dir == decl.dir) {
            i += 1;
        }

        if start == i && !decl.optional {
            return Err(PacketError::MissingStepPacket {
                step: decl.step.to_string(),
            });
        }

        steps.push(ProtocolStep {
            step: decl.step.to_string(),
            dir: decl.dir,
            fragments: pkts[start..i].to_vec(),
        });
    }

    if i != pkts.len() {
        return Err(PacketError::UnexpectedTrailingPacket { index: i });
    }
    Ok(steps)
}
