use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IBlockRegistry {
        struct Signature {
            bytes32 r;
            bytes32 vs;
        }

        struct SignedBlock {
            Signature signature;
            uint256 chainId;
            bytes rlpHeader;
            uint256 cycleEnd;
            address[] validators;
        }

        struct RpcEntry {
            uint256 chainId;
            string rpc;
        }

        event BlockAdded(
            address indexed validator,
            uint256 indexed chainId,
            uint256 indexed blockNumber,
            bytes32 rlpHeaderHash,
            bytes32 payload,
            address[] validators,
            uint256 cycleEnd,
            bytes32 r,
            bytes32 vs
        );

        function getRPCs() external view returns (RpcEntry[] memory);

        function getSignedBlock(uint256 chainId, uint256 number)
            external
            view
            returns (bytes32 blockHash, Signature[] memory signatures, uint256 cycleEnd, address[] memory validators);

        function addSignedBlocks(SignedBlock[] calldata blocks) external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IConsensus {
        function getCurrentCycleStartBlock() external view returns (uint256);
        function getCurrentCycleEndBlock() external view returns (uint256);
        function getValidators() external view returns (address[] memory);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ITokenBridge {
        struct Signature {
            bytes32 r;
            bytes32 vs;
        }

        struct MPTProof {
            bytes32 expectedRoot;
            bytes key;
            bytes[] proof;
            uint256 keyIndex;
            uint256 proofIndex;
            bytes expectedValue;
        }

        struct BlockSignedTxs {
            MPTProof[] receiptProofs;
            bytes blockHeaderRlp;
            uint256 blockNumber;
        }

        struct SignedCheckpoint {
            bytes rlpHeader;
            Signature[] signatures;
            uint256 cycleEnd;
            address[] validators;
        }

        event BridgeRequest(
            address indexed from,
            address indexed to,
            uint256 amount,
            uint256 targetChainId,
            address relay,
            bytes32 indexed id
        );

        function chainVerifiedBlocks(uint256 chainId, uint256 blockNumber) external view returns (bytes32);

        function executedRequests(bytes32 id) external view returns (bool);

        function submitChainBlockParentsAndTxs(
            SignedCheckpoint calldata checkpoint,
            uint256 checkpointBlockNumber,
            bytes[] calldata parentRlpHeaders,
            BlockSignedTxs[] calldata txs
        ) external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct CallResult {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (CallResult[] memory returnData);
    }
}
